//! Progress reporting. Operations take an explicit [`Reporter`] handle; there
//! is no process-wide verbosity state.

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    #[default]
    None,
    Simple,
    Detailed,
}

impl Verbosity {
    /// Map a repeated `-v` flag count: none, `-v` simple, `-vv` detailed.
    pub fn from_count(count: u8) -> Self {
        match count {
            0 => Verbosity::None,
            1 => Verbosity::Simple,
            _ => Verbosity::Detailed,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Reporter {
    verbosity: Verbosity,
}

impl Reporter {
    pub fn new(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    pub fn simple(&self, msg: impl AsRef<str>) {
        if self.verbosity >= Verbosity::Simple {
            println!("  {}", msg.as_ref());
        }
    }

    pub fn detailed(&self, msg: impl AsRef<str>) {
        if self.verbosity >= Verbosity::Detailed {
            println!("  {}", msg.as_ref());
        }
    }
}
