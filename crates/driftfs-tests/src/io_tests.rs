//! File I/O through descriptors: round trips, offsets, descriptor
//! lifecycle, permission semantics.

#[cfg(test)]
mod tests {
    use crate::harness::mounted_session;
    use driftfs_client::handle::{
        O_APPEND, O_CREAT, O_EXCL, O_RDONLY, O_RDWR, O_TRUNC, O_WRONLY,
    };
    use driftfs_client::{ClientError, OpenFlags, SeekWhence};

    fn flags(bits: u32) -> OpenFlags {
        OpenFlags::new(bits)
    }

    #[test]
    fn write_close_reopen_read_round_trip() {
        let (_fs, s) = mounted_session();
        let fd = s.open("/data", flags(O_WRONLY | O_CREAT), 0o644).unwrap();
        let payload = b"the quick brown fox";
        assert_eq!(s.write(fd, None, payload).unwrap(), payload.len());
        s.close(fd).unwrap();

        let fd = s.open("/data", flags(O_RDONLY), 0).unwrap();
        assert_eq!(&s.read(fd, None, 128).unwrap()[..], payload);
        s.close(fd).unwrap();
    }

    #[test]
    fn extreme_offsets_classify_instead_of_panicking() {
        let (_fs, s) = mounted_session();
        let fd = s.open("/f", flags(O_RDWR | O_CREAT), 0o644).unwrap();
        let err = s.write(fd, Some(u64::MAX - 1), b"xy").unwrap_err();
        assert_eq!(err.to_errno(), libc::ENOSPC);
        let err = s.ftruncate(fd, u64::MAX).unwrap_err();
        assert_eq!(err.to_errno(), libc::ENOSPC);
        assert!(s.read(fd, Some(0), usize::MAX).unwrap().is_empty());
        s.close(fd).unwrap();
    }

    #[test]
    fn descriptors_are_reused_lowest_free_first() {
        let (_fs, s) = mounted_session();
        let fd0 = s.open("/a", flags(O_WRONLY | O_CREAT), 0o644).unwrap();
        let fd1 = s.open("/b", flags(O_WRONLY | O_CREAT), 0o644).unwrap();
        let fd2 = s.open("/c", flags(O_WRONLY | O_CREAT), 0o644).unwrap();
        assert_eq!((fd0, fd1, fd2), (0, 1, 2));
        s.close(fd1).unwrap();
        s.close(fd0).unwrap();
        assert_eq!(s.open("/d", flags(O_WRONLY | O_CREAT), 0o644).unwrap(), 0);
        assert_eq!(s.open("/e", flags(O_WRONLY | O_CREAT), 0o644).unwrap(), 1);
        assert_eq!(s.open("/f", flags(O_WRONLY | O_CREAT), 0o644).unwrap(), 3);
    }

    #[test]
    fn reads_at_eof_are_short_then_empty() {
        let (_fs, s) = mounted_session();
        let fd = s.open("/f", flags(O_RDWR | O_CREAT), 0o644).unwrap();
        s.write(fd, Some(0), b"abcde").unwrap();
        assert_eq!(&s.read(fd, None, 3).unwrap()[..], b"abc");
        assert_eq!(&s.read(fd, None, 100).unwrap()[..], b"de");
        assert!(s.read(fd, None, 100).unwrap().is_empty());
    }

    #[test]
    fn positional_io_leaves_the_handle_offset_alone() {
        let (_fs, s) = mounted_session();
        let fd = s.open("/f", flags(O_RDWR | O_CREAT), 0o644).unwrap();
        s.write(fd, None, b"AAAA").unwrap();
        s.write(fd, Some(2), b"bb").unwrap();
        // the sequential offset is still at 4
        s.write(fd, None, b"CC").unwrap();
        assert_eq!(&s.read(fd, Some(0), 16).unwrap()[..], b"AAbbCC");
    }

    #[test]
    fn append_descriptor_always_writes_at_eof() {
        let (_fs, s) = mounted_session();
        let fd = s.open("/log", flags(O_WRONLY | O_CREAT), 0o644).unwrap();
        s.write(fd, None, b"line1\n").unwrap();
        s.close(fd).unwrap();
        let a = s.open("/log", flags(O_WRONLY | O_APPEND), 0).unwrap();
        let b = s.open("/log", flags(O_WRONLY | O_APPEND), 0).unwrap();
        s.write(a, None, b"line2\n").unwrap();
        s.write(b, Some(0), b"line3\n").unwrap();
        let r = s.open("/log", flags(O_RDONLY), 0).unwrap();
        assert_eq!(&s.read(r, None, 64).unwrap()[..], b"line1\nline2\nline3\n");
    }

    #[test]
    fn lseek_whence_variants() {
        let (_fs, s) = mounted_session();
        let fd = s.open("/f", flags(O_RDWR | O_CREAT), 0o644).unwrap();
        s.write(fd, None, b"0123456789").unwrap();
        assert_eq!(s.lseek(fd, 2, SeekWhence::Set).unwrap(), 2);
        assert_eq!(s.lseek(fd, 3, SeekWhence::Cur).unwrap(), 5);
        assert_eq!(s.lseek(fd, -4, SeekWhence::End).unwrap(), 6);
        assert_eq!(&s.read(fd, None, 16).unwrap()[..], b"6789");
        assert_eq!(
            s.lseek(fd, -1, SeekWhence::Set).unwrap_err().to_errno(),
            libc::EINVAL
        );
    }

    #[test]
    fn truncate_shrinks_and_zero_extends() {
        let (_fs, s) = mounted_session();
        let fd = s.open("/f", flags(O_RDWR | O_CREAT), 0o644).unwrap();
        s.write(fd, Some(0), b"abcdef").unwrap();
        s.truncate("/f", 2).unwrap();
        s.ftruncate(fd, 4).unwrap();
        assert_eq!(&s.read(fd, Some(0), 16).unwrap()[..], b"ab\0\0");
    }

    #[test]
    fn open_trunc_discards_previous_content() {
        let (_fs, s) = mounted_session();
        let fd = s.open("/f", flags(O_WRONLY | O_CREAT), 0o644).unwrap();
        s.write(fd, None, b"stale").unwrap();
        s.close(fd).unwrap();
        let fd = s.open("/f", flags(O_WRONLY | O_TRUNC), 0).unwrap();
        s.write(fd, None, b"new").unwrap();
        s.close(fd).unwrap();
        assert_eq!(s.stat("/f").unwrap().size, 3);
    }

    #[test]
    fn excl_create_fails_on_existing() {
        let (_fs, s) = mounted_session();
        let fd = s.open("/f", flags(O_WRONLY | O_CREAT), 0o644).unwrap();
        s.close(fd).unwrap();
        assert_eq!(
            s.open("/f", flags(O_WRONLY | O_CREAT | O_EXCL), 0o644)
                .unwrap_err()
                .to_errno(),
            libc::EEXIST
        );
    }

    #[test]
    fn bad_descriptor_is_ebadf_and_side_effect_free() {
        let (_fs, s) = mounted_session();
        let fd = s.open("/f", flags(O_RDWR | O_CREAT), 0o644).unwrap();
        s.write(fd, None, b"intact").unwrap();
        s.close(fd).unwrap();
        for err in [
            s.read(fd, None, 1).unwrap_err(),
            s.write(fd, None, b"x").unwrap_err(),
            s.fstat(fd).unwrap_err(),
            s.fsync(fd, true).unwrap_err(),
            s.close(fd).unwrap_err(),
            s.read(-1, None, 1).unwrap_err(),
            s.fstat(9999).unwrap_err(),
        ] {
            assert_eq!(err.to_errno(), libc::EBADF);
        }
        let fd = s.open("/f", flags(O_RDONLY), 0).unwrap();
        assert_eq!(&s.read(fd, None, 16).unwrap()[..], b"intact");
    }

    #[test]
    fn open_file_description_outlives_chmod() {
        let (_fs, s) = mounted_session();
        let fd = s.open("/f", flags(O_RDWR | O_CREAT), 0o644).unwrap();
        s.chmod("/f", 0o400).unwrap();
        // the existing descriptor keeps writing
        assert!(s.write(fd, None, b"ok").is_ok());
        // a fresh write-open sees the new bits
        assert_eq!(
            s.open("/f", flags(O_RDWR), 0).unwrap_err().to_errno(),
            libc::EACCES
        );
        assert!(s.open("/f", flags(O_RDONLY), 0).is_ok());
    }

    #[test]
    fn fsync_and_sync_fs_succeed_on_open_files() {
        let (_fs, s) = mounted_session();
        let fd = s.open("/f", flags(O_WRONLY | O_CREAT), 0o644).unwrap();
        s.write(fd, None, b"durable").unwrap();
        s.fsync(fd, true).unwrap();
        s.fsync(fd, false).unwrap();
        s.sync_fs().unwrap();
    }

    #[test]
    fn layout_survives_from_creation_to_introspection() {
        let (_fs, s) = mounted_session();
        let layout = driftfs_meta::types::FileLayout {
            stripe_unit: 1 << 18,
            stripe_count: 3,
            object_size: 1 << 20,
            pool: Some("archive".into()),
        };
        let fd = s
            .open_with_layout("/striped", flags(O_WRONLY | O_CREAT), 0o644, &layout)
            .unwrap();
        assert_eq!(s.get_file_stripe_unit(fd).unwrap(), 1 << 18);
        assert_eq!(s.get_file_replication(fd).unwrap(), 3);
        assert_eq!(s.get_file_pool_name(fd).unwrap(), "archive");
        s.close(fd).unwrap();

        // reopening sees the stored layout, not a default
        let fd = s.open("/striped", flags(O_RDONLY), 0).unwrap();
        assert_eq!(s.get_file_stripe_unit(fd).unwrap(), 1 << 18);
    }

    #[test]
    fn invalid_layout_is_einval_without_creating() {
        let (_fs, s) = mounted_session();
        let bad = driftfs_meta::types::FileLayout {
            stripe_unit: 4096,
            stripe_count: 1,
            object_size: 4095,
            pool: None,
        };
        assert_eq!(
            s.open_with_layout("/f", flags(O_WRONLY | O_CREAT), 0o644, &bad)
                .unwrap_err()
                .to_errno(),
            libc::EINVAL
        );
        assert!(matches!(s.stat("/f"), Err(ClientError::NotFound { .. })));
    }

    #[test]
    fn hardlinked_file_reads_identically_via_both_names() {
        let (_fs, s) = mounted_session();
        let fd = s.open("/one", flags(O_WRONLY | O_CREAT), 0o644).unwrap();
        s.write(fd, None, b"same bytes").unwrap();
        s.close(fd).unwrap();
        s.link("/one", "/two").unwrap();
        assert_eq!(s.stat("/two").unwrap().nlink, 2);
        let fd = s.open("/two", flags(O_RDONLY), 0).unwrap();
        assert_eq!(&s.read(fd, None, 32).unwrap()[..], b"same bytes");
        s.unlink("/one").unwrap();
        assert_eq!(s.stat("/two").unwrap().nlink, 1);
    }
}
