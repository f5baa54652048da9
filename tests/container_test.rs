//! Engine-level tests over an in-memory backend. The [`Container`] engine is
//! generic over `Read + Write + Seek`, so a `Cursor<Vec<u8>>` stands in for
//! the file and the raw byte layout can be inspected directly.

use star::layout::{ENTRY_REGION_OFFSET, METADATA_OFFSET};
use star::{Container, FileStatus, Placement, StarError, FILE_INFO_SIZE};
use std::io::Cursor;

fn members(pairs: &[(&str, &[u8])]) -> Vec<(String, Vec<u8>)> {
    pairs
        .iter()
        .map(|(n, d)| (n.to_string(), d.to_vec()))
        .collect()
}

fn new_container(pairs: &[(&str, &[u8])]) -> Container<Cursor<Vec<u8>>> {
    Container::create(Cursor::new(Vec::new()), &members(pairs)).unwrap()
}

fn le32(buf: &[u8], offset: u64) -> i32 {
    let o = offset as usize;
    i32::from_le_bytes(buf[o..o + 4].try_into().unwrap())
}

#[test]
fn create_writes_the_fixed_layout() {
    let container = new_container(&[("x.txt", b"hello")]);
    let buf = container.into_inner().into_inner();

    // Legacy free count, all-empty slot table, metadata.
    assert_eq!(le32(&buf, 0), 0);
    assert_eq!(le32(&buf, METADATA_OFFSET), 1); // num_files
    assert_eq!(
        le32(&buf, METADATA_OFFSET + 4) as u64, // total_size
        FILE_INFO_SIZE + 5
    );

    // First record header: name, size, then the start_position invariant —
    // the stored offset is that of the content, one header past the header.
    let name_field = &buf[ENTRY_REGION_OFFSET as usize..ENTRY_REGION_OFFSET as usize + 6];
    assert_eq!(name_field, b"x.txt\0");
    assert_eq!(le32(&buf, ENTRY_REGION_OFFSET + 255) as u64, 5);
    assert_eq!(
        le32(&buf, ENTRY_REGION_OFFSET + 259) as u64,
        ENTRY_REGION_OFFSET + FILE_INFO_SIZE
    );
    assert_eq!(le32(&buf, ENTRY_REGION_OFFSET + 263), 0); // Active

    // Content immediately follows its header.
    let content_at = (ENTRY_REGION_OFFSET + FILE_INFO_SIZE) as usize;
    assert_eq!(&buf[content_at..content_at + 5], b"hello");
}

#[test]
fn empty_container_accepts_appends_at_region_start() {
    let mut container = new_container(&[]);
    assert!(container.list().unwrap().is_empty());
    assert_eq!(container.metadata().num_files, 0);

    let outcome = container.append("first.bin", b"abc").unwrap();
    assert_eq!(outcome.placement, Placement::EndOfFile);
    assert_eq!(outcome.header_offset, ENTRY_REGION_OFFSET);
    assert_eq!(container.metadata().num_files, 1);
}

#[test]
fn zero_length_member_round_trips() {
    let mut container = new_container(&[("empty", b""), ("full", b"data")]);
    assert_eq!(container.read_file("empty").unwrap(), b"");

    let outcome = container.delete("empty").unwrap();
    assert_eq!(outcome.freed.size, FILE_INFO_SIZE);
}

#[test]
fn reopen_preserves_state() {
    let mut container = new_container(&[("a", b"aaa"), ("b", b"bbbb"), ("c", b"c")]);
    container.delete("b").unwrap();
    container.append("d", b"dd").unwrap();

    let before_list: Vec<String> = container
        .list()
        .unwrap()
        .into_iter()
        .map(|i| i.name)
        .collect();
    let before_free = container.free_table().clone();
    let before_meta = container.metadata();

    let mut reopened = Container::open(container.into_inner()).unwrap();
    let after_list: Vec<String> = reopened
        .list()
        .unwrap()
        .into_iter()
        .map(|i| i.name)
        .collect();
    assert_eq!(after_list, before_list);
    assert_eq!(reopened.free_table(), &before_free);
    assert_eq!(reopened.metadata(), before_meta);
}

#[test]
fn num_files_counts_slots_ever_written_until_pack() {
    let mut container = new_container(&[("a", b"aa"), ("b", b"bb")]);
    assert_eq!(container.metadata().num_files, 2);

    container.delete("a").unwrap();
    assert_eq!(container.metadata().num_files, 2);

    container.append("c", b"cc").unwrap();
    assert_eq!(container.metadata().num_files, 3);

    container.defragment().unwrap();
    assert_eq!(container.metadata().num_files, 2);
}

#[test]
fn deleted_record_stays_traversable_until_overwritten() {
    let mut container = new_container(&[("a", b"tiny"), ("b", b"bb")]);
    container.delete("a").unwrap();

    // The freed range cannot hold this, so it goes to the end of the file
    // and a's header survives in place.
    let big = vec![b'x'; 1000];
    let outcome = container.append("big", &big).unwrap();
    assert_eq!(outcome.placement, Placement::EndOfFile);

    let err = container.delete("a").unwrap_err();
    assert!(matches!(err, StarError::AlreadyDeleted { .. }));
    let err = container.read_file("a").unwrap_err();
    assert!(matches!(err, StarError::NotFound { .. }));
}

#[test]
fn update_resolves_the_active_record_not_its_deleted_namesake() {
    let mut container = new_container(&[("a", b"version one"), ("b", b"bb")]);
    // Leaves a Deleted "a" header plus a new Active "a" record.
    container.update("a", b"version two..").unwrap();
    assert_eq!(container.read_file("a").unwrap(), b"version two..");

    // A second update must pick the Active one again.
    container.update("a", b"v3").unwrap();
    assert_eq!(container.read_file("a").unwrap(), b"v3");
}

#[test]
fn freeing_more_ranges_than_the_table_holds_is_an_error() {
    // 201 one-byte members; deleting every second one yields non-adjacent
    // ranges that can never coalesce. The 101st release must fail, loudly.
    let pairs: Vec<(String, Vec<u8>)> = (0..201).map(|i| (format!("m{i:03}"), vec![b'x'])).collect();
    let mut container = Container::create(Cursor::new(Vec::new()), &pairs).unwrap();

    for i in (0..200).step_by(2) {
        container.delete(&format!("m{i:03}")).unwrap();
    }
    assert_eq!(container.free_table().len(), 100);

    let err = container.delete("m200").unwrap_err();
    assert!(matches!(err, StarError::CapacityExceeded { .. }));

    // The failed delete must not have touched the record.
    let still_there = container
        .list()
        .unwrap()
        .into_iter()
        .any(|i| i.name == "m200" && i.status == FileStatus::Active);
    assert!(still_there);
}

// Deleting the record in front of a zero-padded gap coalesces them into one
// range whose start is the intact deleted header, leaving the gap mid-range.
// Traversal has to step over it all the same.
#[test]
fn traversal_survives_a_gap_in_the_middle_of_a_coalesced_range() {
    let mut container = new_container(&[("p", b"aaaaa"), ("q", b"bbbbb"), ("r", b"ccccc")]);

    container.delete("p").unwrap();
    // Smaller than p's span: leaves a zeroed 3-byte gap after n.
    container.append("n", b"xx").unwrap();
    container.delete("q").unwrap();
    container.delete("n").unwrap();

    let listed: Vec<String> = container
        .list()
        .unwrap()
        .into_iter()
        .map(|i| i.name)
        .collect();
    assert_eq!(listed, vec!["r"]);

    // n's span, the gap, and q's span all collapsed into a single range.
    assert_eq!(container.free_table().len(), 1);
    let merged = container.free_table().ranges()[0];
    assert_eq!(merged.start, ENTRY_REGION_OFFSET);
    assert_eq!(merged.size, 2 * (FILE_INFO_SIZE + 5));

    // And pack still compacts down to just r.
    let outcome = container.defragment().unwrap();
    assert_eq!(outcome.records_kept, 1);
    assert_eq!(container.read_file("r").unwrap(), b"ccccc");
}

#[test]
fn traversal_reports_corruption_instead_of_walking_garbage() {
    let container = new_container(&[("a", b"aaaa"), ("b", b"bbbb")]);
    let mut buf = container.into_inner().into_inner();

    // Stomp the second record's header. The bytes are neither a valid
    // record nor a registered free range.
    let second = (ENTRY_REGION_OFFSET + FILE_INFO_SIZE + 4) as usize;
    for byte in &mut buf[second..second + FILE_INFO_SIZE as usize] {
        *byte = 0;
    }

    let mut reopened = Container::open(Cursor::new(buf)).unwrap();
    let err = reopened.list().unwrap_err();
    assert!(matches!(err, StarError::CorruptHeader { .. }));
}

#[test]
fn open_rejects_entry_region_shorter_than_metadata_claims() {
    let container = new_container(&[("a", b"aaaa")]);
    let mut buf = container.into_inner().into_inner();
    // Chop off the last content byte.
    buf.pop();

    let err = Container::open(Cursor::new(buf)).unwrap_err();
    assert!(matches!(err, StarError::Truncated { .. }));
}

#[test]
fn long_names_are_clamped_to_the_stored_field() {
    let long = "n".repeat(300);
    let mut container = new_container(&[(long.as_str(), b"data")]);

    // Lookup under the same over-long name matches post-clamping.
    assert_eq!(container.read_file(&long).unwrap(), b"data");
    let listed = container.list().unwrap();
    assert_eq!(listed[0].name.len(), 254);
}

#[test]
fn empty_names_are_rejected() {
    let err = Container::create(
        Cursor::new(Vec::new()),
        &[(String::new(), b"data".to_vec())],
    )
    .unwrap_err();
    assert!(matches!(err, StarError::InvalidName(_)));

    let mut container = new_container(&[]);
    let err = container.append("", b"data").unwrap_err();
    assert!(matches!(err, StarError::InvalidName(_)));
}
