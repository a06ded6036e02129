mod common;

use common::reference_image;
use door_btrieve::{BtrieveConfig, BtrieveFile, BtrieveProcessor};
use std::path::PathBuf;

fn processor(records: &[(&str, u32, &str)]) -> BtrieveProcessor {
    let file = BtrieveFile::parse(&reference_image(records)).unwrap();
    BtrieveProcessor::with_file(file, PathBuf::new(), BtrieveConfig::default())
}

#[test]
fn step_first_then_next_visits_every_record_once_ascending() {
    let mut p = processor(&[("A", 1, "A"), ("B", 2, "B"), ("C", 3, "C"), ("D", 4, "D")]);
    assert!(p.step_first());
    let mut seen = vec![p.position()];
    while p.step_next() {
        seen.push(p.position());
    }
    assert_eq!(seen, [1, 2, 3, 4]);
    assert!(!p.step_next(), "exhausted cursor stays put");
    assert_eq!(p.position(), 4);
}

#[test]
fn step_last_then_previous_visits_descending() {
    let mut p = processor(&[("A", 1, "A"), ("B", 2, "B"), ("C", 3, "C")]);
    assert!(p.step_last());
    let mut seen = vec![p.position()];
    while p.step_previous() {
        seen.push(p.position());
    }
    assert_eq!(seen, [3, 2, 1]);
}

#[test]
fn step_ops_on_an_empty_file_fail() {
    let mut p = processor(&[]);
    assert!(!p.step_first());
    assert!(!p.step_next());
    assert!(!p.step_previous());
    assert!(!p.step_last());
    assert_eq!(p.position(), 0);
}

#[test]
fn current_record_follows_the_cursor() {
    let mut p = processor(&[("First", 1, "F"), ("Second", 2, "S")]);
    assert!(p.step_first());
    assert_eq!(&p.current_record().unwrap()[2..7], b"First");
    assert!(p.step_next());
    assert_eq!(&p.current_record().unwrap()[2..8], b"Second");
}
