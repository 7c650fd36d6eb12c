#[cfg(test)]
mod tests_recovery {
    use segmented_journal::journal::{FRAME_HEADER_SIZE, SEGMENT_HEADER_SIZE};
    use segmented_journal::{JournalConfig, JournalError, ReadMode, SegmentedJournal};
    use std::fs::{self, OpenOptions};
    use std::io::{Read, Seek, SeekFrom, Write};
    use std::path::{Path, PathBuf};

    const SEGMENT_FOR_THREE: usize = SEGMENT_HEADER_SIZE + 3 * (FRAME_HEADER_SIZE + 8);

    fn payload(i: u64) -> Vec<u8> {
        i.to_be_bytes().to_vec()
    }

    fn config(dir: &Path) -> JournalConfig {
        JournalConfig::new(dir).with_max_segment_size(SEGMENT_FOR_THREE)
    }

    fn segment_file(dir: &Path, id: u64) -> PathBuf {
        dir.join(format!("segment-{id:020}.journal"))
    }

    /// XOR one byte of a file in place, without truncating it.
    fn flip_byte(path: &Path, offset: u64, mask: u8) {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .expect("open segment file");
        let mut byte = [0u8; 1];
        file.seek(SeekFrom::Start(offset)).expect("seek");
        file.read_exact(&mut byte).expect("read byte");
        byte[0] ^= mask;
        file.seek(SeekFrom::Start(offset)).expect("seek");
        file.write_all(&byte).expect("write byte");
        file.sync_all().expect("sync");
    }

    fn write_and_close(dir: &Path, count: u64) {
        let journal = SegmentedJournal::open(config(dir)).expect("open");
        let mut writer = journal.writer().expect("writer");
        for i in 1..=count {
            writer.append(payload(i)).expect("append");
        }
        writer.close().expect("close writer");
        journal.close().expect("close journal");
    }

    fn read_all(journal: &SegmentedJournal) -> Vec<(u64, Vec<u8>)> {
        journal
            .open_reader(1, ReadMode::All)
            .expect("reader")
            .map(|entry| {
                let entry = entry.expect("read");
                (entry.index, entry.payload.to_vec())
            })
            .collect()
    }

    #[test]
    fn reopen_restores_entries_and_segments() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_and_close(dir.path(), 8);

        let journal = SegmentedJournal::open(config(dir.path())).expect("reopen");
        assert_eq!(journal.first_index().expect("first"), 1);
        assert_eq!(journal.last_index().expect("last"), 8);
        let segments = journal.segments().expect("segments");
        assert_eq!(segments.len(), 3);
        assert!(segments[0].sealed && segments[1].sealed && !segments[2].sealed);

        let entries = read_all(&journal);
        assert_eq!(entries.len(), 8);
        for (i, (index, data)) in entries.iter().enumerate() {
            assert_eq!(*index, i as u64 + 1);
            assert_eq!(data, &payload(*index));
        }

        let mut writer = journal.writer().expect("writer");
        assert_eq!(writer.append(payload(9)).expect("append").index, 9);
        assert_eq!(
            writer.last_entry().expect("last entry").map(|e| e.index),
            Some(9)
        );
    }

    #[test]
    fn commit_index_is_not_persisted() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let journal = SegmentedJournal::open(config(dir.path())).expect("open");
            let mut writer = journal.writer().expect("writer");
            writer.append(payload(1)).expect("append");
            writer.commit(1);
            writer.flush().expect("flush");
        }
        let journal = SegmentedJournal::open(config(dir.path())).expect("reopen");
        assert_eq!(journal.commit_index(), 0);
        assert_eq!(journal.last_index().expect("last"), 1);
    }

    #[test]
    fn reopen_after_truncate_sees_truncated_log() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let journal = SegmentedJournal::open(config(dir.path())).expect("open");
            let mut writer = journal.writer().expect("writer");
            for i in 1..=8 {
                writer.append(payload(i)).expect("append");
            }
            writer.truncate(5).expect("truncate");
            writer.flush().expect("flush");
        }

        let journal = SegmentedJournal::open(config(dir.path())).expect("reopen");
        assert_eq!(journal.last_index().expect("last"), 5);
        assert_eq!(journal.segment_count().expect("count"), 2);
        assert_eq!(journal.entry(6).expect("read"), None);
        assert!(journal.verify_integrity().is_ok());
    }

    #[test]
    fn reopen_after_reset_starts_at_reset_index() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let journal = SegmentedJournal::open(config(dir.path())).expect("open");
            let mut writer = journal.writer().expect("writer");
            for i in 1..=10 {
                writer.append(payload(i)).expect("append");
            }
            writer.reset(100).expect("reset");
            writer.append(payload(100)).expect("append");
            writer.flush().expect("flush");
        }

        let journal = SegmentedJournal::open(config(dir.path())).expect("reopen");
        assert_eq!(journal.first_index().expect("first"), 100);
        assert_eq!(journal.last_index().expect("last"), 100);
        assert_eq!(journal.segment_count().expect("count"), 1);
    }

    #[test]
    fn leftovers_of_an_interrupted_reset_are_discarded() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_and_close(dir.path(), 5);

        // Simulate a crash after the fresh segment was created but before the
        // old ones were deleted: stash the old files, reset, restore them.
        let stash = tempfile::tempdir().expect("tempdir");
        for id in [1u64, 2] {
            fs::copy(segment_file(dir.path(), id), segment_file(stash.path(), id)).expect("stash");
        }
        {
            let journal = SegmentedJournal::open(config(dir.path())).expect("open");
            let mut writer = journal.writer().expect("writer");
            writer.reset(50).expect("reset");
            writer.append(payload(50)).expect("append");
            writer.flush().expect("flush");
        }
        for id in [1u64, 2] {
            fs::copy(segment_file(stash.path(), id), segment_file(dir.path(), id)).expect("restore");
        }

        let journal = SegmentedJournal::open(config(dir.path())).expect("reopen");
        assert_eq!(journal.first_index().expect("first"), 50);
        assert_eq!(journal.last_index().expect("last"), 50);
        assert!(!segment_file(dir.path(), 1).exists());
        assert!(!segment_file(dir.path(), 2).exists());
    }

    #[test]
    fn interrupted_reset_inside_the_active_segment_is_discarded() {
        let dir = tempfile::tempdir().expect("tempdir");
        let roomy = |dir: &Path| {
            JournalConfig::new(dir)
                .with_max_segment_size(SEGMENT_HEADER_SIZE + 8 * (FRAME_HEADER_SIZE + 8))
        };
        {
            let journal = SegmentedJournal::open(roomy(dir.path())).expect("open");
            let mut writer = journal.writer().expect("writer");
            for i in 1..=5 {
                writer.append(payload(i)).expect("append");
            }
            writer.close().expect("close writer");
        }

        // The fresh segment starts at 3 while the old one still holds 1..=5.
        let stash = tempfile::tempdir().expect("tempdir");
        fs::copy(segment_file(dir.path(), 1), segment_file(stash.path(), 1)).expect("stash");
        {
            let journal = SegmentedJournal::open(roomy(dir.path())).expect("open");
            let mut writer = journal.writer().expect("writer");
            writer.reset(3).expect("reset");
            writer.append(payload(33)).expect("append");
            writer.flush().expect("flush");
        }
        fs::copy(segment_file(stash.path(), 1), segment_file(dir.path(), 1)).expect("restore");

        let journal = SegmentedJournal::open(roomy(dir.path())).expect("reopen");
        assert_eq!(journal.first_index().expect("first"), 3);
        assert_eq!(journal.last_index().expect("last"), 3);
        assert_eq!(
            journal.entry(3).expect("read").map(|e| e.payload.to_vec()),
            Some(payload(33))
        );
        assert!(!segment_file(dir.path(), 1).exists());
    }

    #[test]
    fn corrupt_frame_in_sealed_segment_fails_open() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let journal = SegmentedJournal::open(config(dir.path())).expect("open");
            let mut writer = journal.writer().expect("writer");
            for i in 1..=5 {
                writer.append(payload(i)).expect("append");
            }
            writer.commit(5);
            writer.close().expect("close writer");
        }

        // Segment 1 holds 1..=3; damage the payload of entry 2.
        let path = segment_file(dir.path(), 1);
        let second = SEGMENT_HEADER_SIZE + FRAME_HEADER_SIZE + 8;
        flip_byte(&path, (second + FRAME_HEADER_SIZE) as u64, 0xFF);
        let damaged = fs::read(&path).expect("read segment");

        let err = SegmentedJournal::open(config(dir.path())).expect_err("corrupt sealed segment");
        assert!(matches!(err, JournalError::CorruptSegment { .. }));

        // Nothing was deleted or rewritten.
        assert!(path.exists());
        assert!(segment_file(dir.path(), 2).exists());
        assert_eq!(fs::read(&path).expect("read segment"), damaged);
    }

    #[test]
    fn torn_tail_is_discarded_on_open() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_and_close(dir.path(), 5);

        // Second segment holds 4 and 5; corrupt the payload of entry 5.
        let fifth = SEGMENT_HEADER_SIZE + FRAME_HEADER_SIZE + 8;
        flip_byte(
            &segment_file(dir.path(), 2),
            (fifth + FRAME_HEADER_SIZE) as u64,
            0xFF,
        );

        let journal = SegmentedJournal::open(config(dir.path())).expect("reopen");
        assert_eq!(journal.last_index().expect("last"), 4);

        let mut writer = journal.writer().expect("writer");
        assert_eq!(writer.append(payload(55)).expect("append").index, 5);
        assert!(journal.verify_integrity().is_ok());
    }

    #[test]
    fn verify_integrity_reports_bit_rot() {
        let dir = tempfile::tempdir().expect("tempdir");
        let journal = SegmentedJournal::open(config(dir.path())).expect("open");
        let mut writer = journal.writer().expect("writer");
        for i in 1..=3 {
            writer.append(payload(i)).expect("append");
        }
        writer.flush().expect("flush");
        assert!(journal.verify_integrity().is_ok());

        // Flip a byte of entry 2 behind the journal's back.
        let second = SEGMENT_HEADER_SIZE + FRAME_HEADER_SIZE + 8;
        flip_byte(
            &segment_file(dir.path(), 1),
            (second + FRAME_HEADER_SIZE + 1) as u64,
            0x01,
        );

        let err = journal.verify_integrity().expect_err("corrupt");
        assert!(matches!(err, JournalError::CorruptEntry { index: 2, .. }));
        assert!(matches!(
            journal.entry(2),
            Err(JournalError::CorruptEntry { index: 2, .. })
        ));
    }

    #[test]
    fn corrupt_header_fails_open() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_and_close(dir.path(), 2);

        flip_byte(&segment_file(dir.path(), 1), 10, 0xFF);

        let err = SegmentedJournal::open(config(dir.path())).expect_err("corrupt header");
        assert!(matches!(err, JournalError::CorruptSegment { .. }));
    }

    #[test]
    fn renamed_segment_file_fails_open() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_and_close(dir.path(), 2);
        fs::rename(segment_file(dir.path(), 1), segment_file(dir.path(), 7)).expect("rename");

        let err = SegmentedJournal::open(config(dir.path())).expect_err("id mismatch");
        assert!(matches!(err, JournalError::CorruptSegment { .. }));
    }

    #[test]
    fn foreign_files_are_ignored() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_and_close(dir.path(), 2);
        fs::write(dir.path().join("README"), b"not a segment").expect("write");

        let journal = SegmentedJournal::open(config(dir.path())).expect("reopen");
        assert_eq!(journal.last_index().expect("last"), 2);
    }

    #[test]
    fn config_from_json_opens_journal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let json = format!(
            r#"{{"directory": {:?}, "max_segment_size": {SEGMENT_FOR_THREE}, "index_interval": 2}}"#,
            dir.path().display().to_string()
        );
        let config = JournalConfig::from_json(&json).expect("config");
        assert_eq!(config.max_entries_per_segment, None);

        let journal = SegmentedJournal::open(config).expect("open");
        let mut writer = journal.writer().expect("writer");
        for i in 1..=4 {
            writer.append(payload(i)).expect("append");
        }
        assert_eq!(journal.segment_count().expect("count"), 2);
    }
}
