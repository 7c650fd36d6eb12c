#[cfg(test)]
mod tests_reader {
    use segmented_journal::journal::{FRAME_HEADER_SIZE, SEGMENT_HEADER_SIZE};
    use segmented_journal::{JournalConfig, JournalError, ReadMode, SegmentedJournal};
    use std::thread;

    const SEGMENT_FOR_THREE: usize = SEGMENT_HEADER_SIZE + 3 * (FRAME_HEADER_SIZE + 8);

    fn payload(i: u64) -> Vec<u8> {
        i.to_be_bytes().to_vec()
    }

    fn journal_with(dir: &std::path::Path, count: u64) -> SegmentedJournal {
        let journal = SegmentedJournal::open(
            JournalConfig::new(dir)
                .with_max_segment_size(SEGMENT_FOR_THREE)
                .with_index_interval(2),
        )
        .expect("open");
        let mut writer = journal.writer().expect("writer");
        for i in 1..=count {
            writer.append(payload(i)).expect("append");
        }
        writer.close().expect("close writer");
        journal
    }

    fn indices(reader: &mut segmented_journal::JournalReader) -> Vec<u64> {
        reader.map(|entry| entry.expect("read").index).collect()
    }

    #[test]
    fn iterates_across_segments_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let journal = journal_with(dir.path(), 10);
        let mut reader = journal.open_reader(1, ReadMode::All).expect("reader");

        assert!(reader.has_next().expect("has next"));
        assert_eq!(indices(&mut reader), (1..=10).collect::<Vec<_>>());
        assert!(!reader.has_next().expect("has next"));
        assert_eq!(reader.current_index().expect("current"), 10);
    }

    #[test]
    fn seek_positions_the_next_read() {
        let dir = tempfile::tempdir().expect("tempdir");
        let journal = journal_with(dir.path(), 10);
        let mut reader = journal.open_reader(1, ReadMode::All).expect("reader");

        assert!(reader.seek(7).expect("seek"));
        assert_eq!(reader.next().expect("entry").expect("read").index, 7);

        assert!(!reader.seek(11).expect("seek past end"));
        assert!(reader.next().is_none());

        assert!(!reader.seek(0).expect("seek before start"));
        assert_eq!(reader.next_index().expect("next"), 1);

        reader.seek_to_last().expect("seek last");
        assert_eq!(indices(&mut reader), vec![10]);

        reader.seek_to_first().expect("seek first");
        assert_eq!(reader.next().expect("entry").expect("read").index, 1);
    }

    #[test]
    fn reader_opened_before_first_index_is_clamped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let journal = journal_with(dir.path(), 7);
        journal.compact(4).expect("compact");

        let mut reader = journal.open_reader(1, ReadMode::All).expect("reader");
        assert_eq!(reader.next_index().expect("next"), 4);
        assert_eq!(indices(&mut reader), vec![4, 5, 6, 7]);
    }

    #[test]
    fn committed_mode_stops_at_commit_index() {
        let dir = tempfile::tempdir().expect("tempdir");
        let journal = journal_with(dir.path(), 6);
        journal.set_commit_index(4);

        let mut committed = journal.open_reader(1, ReadMode::Committed).expect("reader");
        let mut all = journal.open_reader(1, ReadMode::All).expect("reader");
        assert_eq!(committed.mode(), ReadMode::Committed);
        assert_eq!(indices(&mut committed), vec![1, 2, 3, 4]);
        assert_eq!(indices(&mut all).len(), 6);

        assert!(!committed.seek(5).expect("seek"));
        journal.set_commit_index(6);
        assert!(committed.has_next().expect("has next"));
        assert_eq!(indices(&mut committed), vec![5, 6]);
    }

    #[test]
    fn reader_follows_rollover_of_a_live_writer() {
        let dir = tempfile::tempdir().expect("tempdir");
        let journal = journal_with(dir.path(), 0);
        let mut reader = journal.open_reader(1, ReadMode::All).expect("reader");
        let mut writer = journal.writer().expect("writer");

        for i in 1..=9 {
            writer.append(payload(i)).expect("append");
            let entry = reader.next().expect("entry").expect("read");
            assert_eq!(entry.index, i);
            assert_eq!(entry.payload.to_vec(), payload(i));
            assert!(reader.next().is_none());
        }
        assert_eq!(journal.segment_count().expect("count"), 3);
    }

    #[test]
    fn dropped_readers_are_not_clamped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let journal = journal_with(dir.path(), 6);
        for _ in 0..16 {
            let reader = journal.open_reader(3, ReadMode::All).expect("reader");
            drop(reader);
        }
        let mut survivor = journal.open_reader(6, ReadMode::All).expect("reader");

        let mut writer = journal.writer().expect("writer");
        writer.truncate(2).expect("truncate");
        assert_eq!(survivor.next_index().expect("next"), 3);
        assert!(survivor.next().is_none());
    }

    #[test]
    fn reads_fail_after_close() {
        let dir = tempfile::tempdir().expect("tempdir");
        let journal = journal_with(dir.path(), 3);
        let mut reader = journal.open_reader(1, ReadMode::All).expect("reader");
        journal.close().expect("close");

        assert!(matches!(reader.next(), Some(Err(JournalError::Closed))));
        assert!(matches!(
            journal.open_reader(1, ReadMode::All),
            Err(JournalError::Closed)
        ));
    }

    #[test]
    fn concurrent_reader_sees_every_entry_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let journal = journal_with(dir.path(), 0);
        let total = 200u64;
        let mut reader = journal.open_reader(1, ReadMode::Committed).expect("reader");

        let consumer = thread::spawn(move || {
            let mut seen = Vec::with_capacity(total as usize);
            while seen.len() < total as usize {
                match reader.next() {
                    Some(Ok(entry)) => seen.push(entry.index),
                    Some(Err(e)) => panic!("read failed: {e}"),
                    None => thread::yield_now(),
                }
            }
            seen
        });

        let mut writer = journal.writer().expect("writer");
        for i in 1..=total {
            writer.append(payload(i)).expect("append");
            writer.commit(i);
        }

        let seen = consumer.join().expect("consumer");
        assert_eq!(seen, (1..=total).collect::<Vec<_>>());
    }
}
