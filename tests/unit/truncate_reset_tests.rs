#[cfg(test)]
mod tests_truncate_reset {
    use segmented_journal::journal::{FRAME_HEADER_SIZE, SEGMENT_HEADER_SIZE};
    use segmented_journal::{
        CountingJournalMetrics, JournalConfig, JournalError, JournalWriter, ReadMode,
        SegmentedJournal,
    };
    use std::sync::Arc;

    const SEGMENT_FOR_THREE: usize = SEGMENT_HEADER_SIZE + 3 * (FRAME_HEADER_SIZE + 8);

    fn payload(i: u64) -> Vec<u8> {
        i.to_be_bytes().to_vec()
    }

    fn filled(dir: &std::path::Path, count: u64) -> (SegmentedJournal, JournalWriter) {
        let journal = SegmentedJournal::open(
            JournalConfig::new(dir).with_max_segment_size(SEGMENT_FOR_THREE),
        )
        .expect("open");
        let mut writer = journal.writer().expect("writer");
        for i in 1..=count {
            writer.append(payload(i)).expect("append");
        }
        (journal, writer)
    }

    #[test]
    fn truncate_below_commit_fails_and_changes_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (journal, mut writer) = filled(dir.path(), 5);
        writer.commit(3);

        let err = writer.truncate(2).expect_err("below commit");
        assert!(matches!(
            err,
            JournalError::TruncateBelowCommit {
                index: 2,
                commit_index: 3
            }
        ));
        assert!(err.is_bounds_violation());
        assert_eq!(writer.last_index().expect("last"), 5);
        assert_eq!(journal.segment_count().expect("count"), 2);
        assert!(journal.entry(5).expect("read").is_some());
    }

    #[test]
    fn truncate_at_commit_is_allowed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (_journal, mut writer) = filled(dir.path(), 5);
        writer.commit(3);
        writer.truncate(3).expect("truncate at commit");
        assert_eq!(writer.last_index().expect("last"), 3);
    }

    #[test]
    fn truncate_drops_only_the_suffix() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (journal, mut writer) = filled(dir.path(), 5);
        writer.commit(3);

        writer.truncate(4).expect("truncate");
        assert_eq!(writer.last_index().expect("last"), 4);
        assert_eq!(journal.entry(5).expect("read"), None);
        for i in 1..=4 {
            let entry = journal.entry(i).expect("read").expect("present");
            assert_eq!(entry.payload.as_ref(), payload(i).as_slice());
        }

        let next = writer.append(payload(50)).expect("append");
        assert_eq!(next.index, 5);
        assert_eq!(
            journal.entry(5).expect("read").map(|e| e.payload.to_vec()),
            Some(payload(50))
        );
    }

    #[test]
    fn truncate_removes_trailing_segments() {
        let dir = tempfile::tempdir().expect("tempdir");
        let metrics = Arc::new(CountingJournalMetrics::new());
        let journal = SegmentedJournal::open_with_metrics(
            JournalConfig::new(dir.path()).with_max_segment_size(SEGMENT_FOR_THREE),
            metrics.clone(),
        )
        .expect("open");
        let mut writer = journal.writer().expect("writer");
        for i in 1..=10 {
            writer.append(payload(i)).expect("append");
        }
        assert_eq!(journal.segment_count().expect("count"), 4);

        writer.truncate(4).expect("truncate");
        let segments = journal.segments().expect("segments");
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[1].base_index, 4);
        assert_eq!(segments[1].last_index, 4);
        assert!(!segments[1].sealed);
        assert_eq!(metrics.segment_truncations(), 1);

        // the emptied tail is refilled and rolls over again
        for i in 5..=8 {
            assert_eq!(writer.append(payload(i)).expect("append").index, i);
        }
        assert_eq!(journal.segment_count().expect("count"), 3);
    }

    #[test]
    fn truncate_to_zero_empties_the_journal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (journal, mut writer) = filled(dir.path(), 7);

        writer.truncate(0).expect("truncate");
        assert!(journal.is_empty().expect("empty"));
        assert_eq!(journal.segment_count().expect("count"), 1);
        assert_eq!(writer.next_index().expect("next"), 1);
        assert_eq!(writer.last_entry().expect("last entry"), None);
    }

    #[test]
    fn truncate_past_the_end_is_a_noop() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (journal, mut writer) = filled(dir.path(), 4);
        writer.truncate(40).expect("truncate");
        assert_eq!(journal.last_index().expect("last"), 4);
    }

    #[test]
    fn reset_forward_starts_an_empty_log() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (journal, mut writer) = filled(dir.path(), 10);

        writer.reset(100).expect("reset");
        assert!(journal.is_empty().expect("empty"));
        assert_eq!(journal.first_index().expect("first"), 100);
        assert_eq!(journal.last_index().expect("last"), 99);
        assert_eq!(journal.segment_count().expect("count"), 1);
        assert_eq!(writer.last_entry().expect("last entry"), None);

        let entry = writer.append(payload(100)).expect("append");
        assert_eq!(entry.index, 100);
        assert_eq!(journal.entry(5).expect("read"), None);
    }

    #[test]
    fn reset_within_the_active_segment_truncates() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (journal, mut writer) = filled(dir.path(), 5);

        // active segment starts at 4
        writer.reset(3).expect("reset");
        assert_eq!(writer.next_index().expect("next"), 3);
        assert_eq!(journal.first_index().expect("first"), 1);
        assert_eq!(journal.segment_count().expect("count"), 1);
        assert!(journal.entry(2).expect("read").is_some());
        assert_eq!(journal.entry(3).expect("read"), None);
    }

    #[test]
    fn reset_backward_respects_commit() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (journal, mut writer) = filled(dir.path(), 5);
        writer.commit(4);

        assert!(matches!(
            writer.reset(2),
            Err(JournalError::TruncateBelowCommit { .. })
        ));
        assert_eq!(journal.last_index().expect("last"), 5);
        assert!(matches!(
            writer.reset(0),
            Err(JournalError::IndexOutOfRange { index: 0, .. })
        ));
    }

    #[test]
    fn readers_are_clamped_after_truncate_and_reset() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (journal, mut writer) = filled(dir.path(), 9);
        let mut reader = journal.open_reader(1, ReadMode::All).expect("reader");
        for _ in 0..8 {
            reader.next().expect("entry").expect("read");
        }
        assert_eq!(reader.next_index().expect("next"), 9);

        writer.truncate(5).expect("truncate");
        assert_eq!(reader.next_index().expect("next"), 6);
        assert!(reader.next().is_none());

        writer.append(payload(60)).expect("append");
        let entry = reader.next().expect("entry").expect("read");
        assert_eq!(entry.index, 6);
        assert_eq!(entry.payload.to_vec(), payload(60));

        writer.reset(20).expect("reset");
        assert_eq!(reader.next_index().expect("next"), 20);
        assert!(reader.next().is_none());
        writer.append(payload(20)).expect("append");
        assert_eq!(reader.next().expect("entry").expect("read").index, 20);
    }

    #[test]
    fn compact_removes_sealed_head_segments() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (journal, _writer) = filled(dir.path(), 10);
        let mut reader = journal.open_reader(1, ReadMode::All).expect("reader");

        // segments start at 1, 4, 7, 10
        assert_eq!(journal.compact(5).expect("compact"), 1);
        assert_eq!(journal.first_index().expect("first"), 4);
        assert_eq!(reader.next().expect("entry").expect("read").index, 4);

        assert_eq!(journal.compact(100).expect("compact"), 2);
        assert_eq!(journal.segment_count().expect("count"), 1);
        assert_eq!(journal.first_index().expect("first"), 10);
        assert_eq!(reader.next_index().expect("next"), 10);
        assert_eq!(journal.last_index().expect("last"), 10);
    }
}
