//! Extended attributes end to end: probes, dispositions, link-vs-target
//! addressing.

#[cfg(test)]
mod tests {
    use crate::harness::mounted_session;
    use driftfs_client::handle::{O_CREAT, O_WRONLY};
    use driftfs_client::{ClientError, OpenFlags, Session};
    use driftfs_meta::types::XattrDisposition;
    use driftfs_meta::MemoryFs;
    use std::sync::Arc;

    fn with_file() -> (Arc<MemoryFs>, Session) {
        let (fs, s) = mounted_session();
        let fd = s
            .open("/f", OpenFlags::new(O_WRONLY | O_CREAT), 0o644)
            .unwrap();
        s.close(fd).unwrap();
        (fs, s)
    }

    #[test]
    fn probe_then_fetch_with_exact_buffer() {
        let (_fs, s) = with_file();
        s.setxattr("/f", "user.note", b"a longer value", XattrDisposition::Either)
            .unwrap();
        let needed = s.getxattr("/f", "user.note", None).unwrap();
        assert_eq!(needed, 14);
        let mut buf = vec![0u8; needed];
        assert_eq!(s.getxattr("/f", "user.note", Some(&mut buf)).unwrap(), 14);
        assert_eq!(&buf[..], b"a longer value");
    }

    #[test]
    fn undersized_buffer_is_erange_with_needed_size() {
        let (_fs, s) = with_file();
        s.setxattr("/f", "user.k", b"0123456789abcdef", XattrDisposition::Either)
            .unwrap();
        let mut buf = [0u8; 8];
        let err = s.getxattr("/f", "user.k", Some(&mut buf)).unwrap_err();
        assert_eq!(err.to_errno(), libc::ERANGE);
        match err {
            ClientError::RangeTooSmall { needed } => assert_eq!(needed, Some(16)),
            other => panic!("expected RangeTooSmall, got {other:?}"),
        }
    }

    #[test]
    fn missing_attribute_is_enodata() {
        let (_fs, s) = with_file();
        assert_eq!(
            s.getxattr("/f", "user.none", None).unwrap_err().to_errno(),
            libc::ENODATA
        );
        assert_eq!(
            s.removexattr("/f", "user.none").unwrap_err().to_errno(),
            libc::ENODATA
        );
    }

    #[test]
    fn create_and_replace_dispositions_enforced() {
        let (_fs, s) = with_file();
        assert_eq!(
            s.setxattr("/f", "user.k", b"v", XattrDisposition::Replace)
                .unwrap_err()
                .to_errno(),
            libc::ENODATA
        );
        s.setxattr("/f", "user.k", b"v1", XattrDisposition::Create)
            .unwrap();
        assert_eq!(
            s.setxattr("/f", "user.k", b"v2", XattrDisposition::Create)
                .unwrap_err()
                .to_errno(),
            libc::EEXIST
        );
        s.setxattr("/f", "user.k", b"v2", XattrDisposition::Replace)
            .unwrap();
        let mut buf = [0u8; 8];
        let len = s.getxattr("/f", "user.k", Some(&mut buf)).unwrap();
        assert_eq!(&buf[..len], b"v2");
    }

    #[test]
    fn list_set_remove_cycle() {
        let (_fs, s) = with_file();
        assert!(s.listxattr("/f").unwrap().is_empty());
        s.setxattr("/f", "user.a", b"1", XattrDisposition::Either)
            .unwrap();
        s.setxattr("/f", "user.b", b"2", XattrDisposition::Either)
            .unwrap();
        let mut names = s.listxattr("/f").unwrap();
        names.sort();
        assert_eq!(names, vec!["user.a", "user.b"]);
        s.removexattr("/f", "user.a").unwrap();
        assert_eq!(s.listxattr("/f").unwrap(), vec!["user.b"]);
    }

    #[test]
    fn symlink_attrs_separate_from_target_attrs() {
        let (_fs, s) = with_file();
        s.symlink("/f", "/l").unwrap();
        s.setxattr("/l", "user.via-follow", b"on target", XattrDisposition::Either)
            .unwrap();
        s.lsetxattr("/l", "user.on-link", b"on link", XattrDisposition::Either)
            .unwrap();

        assert_eq!(s.listxattr("/f").unwrap(), vec!["user.via-follow"]);
        assert_eq!(s.llistxattr("/l").unwrap(), vec!["user.on-link"]);
        assert_eq!(s.lgetxattr("/l", "user.on-link", None).unwrap(), 7);
        assert_eq!(
            s.lgetxattr("/l", "user.via-follow", None)
                .unwrap_err()
                .to_errno(),
            libc::ENODATA
        );
        s.lremovexattr("/l", "user.on-link").unwrap();
        assert!(s.llistxattr("/l").unwrap().is_empty());
    }

    #[test]
    fn directories_carry_xattrs_too() {
        let (_fs, s) = mounted_session();
        s.mkdir("/d", 0o755).unwrap();
        s.setxattr("/d", "user.tag", b"dir-value", XattrDisposition::Either)
            .unwrap();
        assert_eq!(s.getxattr("/d", "user.tag", None).unwrap(), 9);
    }

    #[test]
    fn empty_value_round_trips() {
        let (_fs, s) = with_file();
        s.setxattr("/f", "user.flag", b"", XattrDisposition::Either)
            .unwrap();
        assert_eq!(s.getxattr("/f", "user.flag", None).unwrap(), 0);
        assert_eq!(s.listxattr("/f").unwrap(), vec!["user.flag"]);
    }
}
