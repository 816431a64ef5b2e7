mod common;

use common::{mount, read_file, write_file};

use async_glfs::dict::xattr_flags::{XATTR_CREATE, XATTR_REPLACE};
use async_glfs::{Errno, Timespec};

use std::path::Path;

use async_std::task::block_on;

fn p(path: &str) -> &Path {
    Path::new(path)
}

#[test]
fn open_missing_and_directory() {
    block_on(async {
        let (_, session) = mount();
        assert_eq!(session.open(p("/missing"), libc::O_RDONLY).await.err(), Some(Errno::ENOENT));
        assert_eq!(session.open(p("/a/b"), libc::O_RDONLY).await.err(), Some(Errno::ENOENT));

        session.mkdir(p("/d"), 0o755).await.unwrap();
        assert_eq!(session.open(p("/d"), libc::O_RDONLY).await.err(), Some(Errno::EISDIR));
        assert_eq!(
            session.creat(p("/d"), libc::O_RDWR, 0o644).await.err(),
            Some(Errno::EISDIR)
        );
    });
}

#[test]
fn exclusive_create_of_existing_file() {
    block_on(async {
        let (volume, session) = mount();
        write_file(&session, "/f", b"data").await;
        assert_eq!(volume.inode_refs(p("/f")).await, Some(0));

        let ret = session
            .creat(p("/f"), libc::O_RDWR | libc::O_EXCL, 0o644)
            .await;
        assert_eq!(ret.err(), Some(Errno::EEXIST));
        assert_eq!(volume.inode_refs(p("/f")).await, Some(0));
        assert_eq!(read_file(&session, "/f").await, b"data");
    });
}

#[test]
fn create_missing_parent() {
    block_on(async {
        let (_, session) = mount();
        let ret = session.creat(p("/no/f"), libc::O_RDWR, 0o644).await;
        assert_eq!(ret.err(), Some(Errno::ENOENT));
    });
}

#[test]
fn create_through_dangling_symlink() {
    block_on(async {
        let (_, session) = mount();
        session.symlink(p("/target"), p("/link")).await.unwrap();
        assert_eq!(session.stat(p("/link")).await.err(), Some(Errno::ENOENT));

        let fd = session.creat(p("/link"), libc::O_WRONLY, 0o644).await.unwrap();
        assert_eq!(fd.write(b"x", 0).await.unwrap(), 1);
        fd.close().await.unwrap();

        let target = session.stat(p("/target")).await.unwrap();
        assert_eq!(target.st_mode & libc::S_IFMT, libc::S_IFREG);
        assert_eq!(target.st_size, 1);

        let link = session.lstat(p("/link")).await.unwrap();
        assert_eq!(link.st_mode & libc::S_IFMT, libc::S_IFLNK);
        assert_eq!(session.stat(p("/link")).await.unwrap().st_ino, target.st_ino);
    });
}

#[test]
fn symlink_loop() {
    block_on(async {
        let (_, session) = mount();
        session.symlink(p("/b"), p("/a")).await.unwrap();
        session.symlink(p("/a"), p("/b")).await.unwrap();
        assert_eq!(session.stat(p("/a")).await.err(), Some(Errno::ELOOP));
        assert!(session.lstat(p("/a")).await.is_ok());
    });
}

#[test]
fn readlink_truncates() {
    block_on(async {
        let (_, session) = mount();
        session.symlink(p("/some/where"), p("/link")).await.unwrap();

        let mut buf = [0_u8; 64];
        let len = session.readlink(p("/link"), &mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"/some/where");

        let mut small = [0_u8; 5];
        assert_eq!(session.readlink(p("/link"), &mut small).await.unwrap(), 5);
        assert_eq!(&small, b"/some");
        assert_eq!(session.readlink(p("/link"), &mut []).await.err(), Some(Errno::EINVAL));

        write_file(&session, "/f", b"").await;
        assert_eq!(session.readlink(p("/f"), &mut buf).await.err(), Some(Errno::EINVAL));
    });
}

#[test]
fn mkdir_and_mknod() {
    block_on(async {
        let (_, session) = mount();
        session.mkdir(p("/d"), 0o750).await.unwrap();
        assert_eq!(session.mkdir(p("/d"), 0o750).await.err(), Some(Errno::EEXIST));

        let stat = session.stat(p("/d")).await.unwrap();
        assert_eq!(stat.st_mode, libc::S_IFDIR | 0o750);
        assert_eq!(stat.st_nlink, 2);

        session.mknod(p("/d/fifo"), libc::S_IFIFO | 0o600, 0).await.unwrap();
        let fifo = session.stat(p("/d/fifo")).await.unwrap();
        assert_eq!(fifo.st_mode & libc::S_IFMT, libc::S_IFIFO);
        assert_eq!(session.stat(p("/d")).await.unwrap().st_nlink, 2);

        session.mkdir(p("/d/e"), 0o755).await.unwrap();
        assert_eq!(session.stat(p("/d")).await.unwrap().st_nlink, 3);
    });
}

#[test]
fn unlink_and_rmdir() {
    block_on(async {
        let (_, session) = mount();
        session.mkdir(p("/d"), 0o755).await.unwrap();
        session.mkdir(p("/d/e"), 0o755).await.unwrap();
        write_file(&session, "/f", b"x").await;

        assert_eq!(session.unlink(p("/d")).await.err(), Some(Errno::EISDIR));
        assert_eq!(session.rmdir(p("/f")).await.err(), Some(Errno::ENOTDIR));
        assert_eq!(session.rmdir(p("/d")).await.err(), Some(Errno::ENOTEMPTY));

        session.rmdir(p("/d/e")).await.unwrap();
        session.rmdir(p("/d")).await.unwrap();
        session.unlink(p("/f")).await.unwrap();
        assert_eq!(session.stat(p("/d")).await.err(), Some(Errno::ENOENT));
        assert_eq!(session.stat(p("/f")).await.err(), Some(Errno::ENOENT));
        assert_eq!(session.unlink(p("/f")).await.err(), Some(Errno::ENOENT));
    });
}

#[test]
fn unlink_symlink_itself() {
    block_on(async {
        let (_, session) = mount();
        write_file(&session, "/f", b"x").await;
        session.symlink(p("/f"), p("/link")).await.unwrap();
        session.unlink(p("/link")).await.unwrap();
        assert_eq!(session.lstat(p("/link")).await.err(), Some(Errno::ENOENT));
        assert!(session.stat(p("/f")).await.is_ok());
    });
}

#[test]
fn rename_directory_file_mismatch() {
    block_on(async {
        let (_, session) = mount();
        session.mkdir(p("/d"), 0o755).await.unwrap();
        write_file(&session, "/f", b"x").await;

        assert_eq!(session.rename(p("/d"), p("/f")).await.err(), Some(Errno::EISDIR));
        assert_eq!(session.rename(p("/f"), p("/d")).await.err(), Some(Errno::EISDIR));

        assert!(session.stat(p("/d")).await.unwrap().st_mode & libc::S_IFMT == libc::S_IFDIR);
        assert_eq!(read_file(&session, "/f").await, b"x");
    });
}

#[test]
fn rename_to_missing_and_existing() {
    block_on(async {
        let (_, session) = mount();
        write_file(&session, "/a", b"aaa").await;
        write_file(&session, "/b", b"b").await;
        session.mkdir(p("/d"), 0o755).await.unwrap();

        session.rename(p("/a"), p("/d/c")).await.unwrap();
        assert_eq!(session.stat(p("/a")).await.err(), Some(Errno::ENOENT));
        assert_eq!(read_file(&session, "/d/c").await, b"aaa");

        session.rename(p("/b"), p("/d/c")).await.unwrap();
        assert_eq!(read_file(&session, "/d/c").await, b"b");
        assert_eq!(session.stat(p("/b")).await.err(), Some(Errno::ENOENT));

        assert_eq!(
            session.rename(p("/missing"), p("/x")).await.err(),
            Some(Errno::ENOENT)
        );
        assert_eq!(session.rename(p("/d"), p("/d/sub")).await.err(), Some(Errno::EINVAL));
    });
}

#[test]
fn hard_links() {
    block_on(async {
        let (_, session) = mount();
        write_file(&session, "/f", b"abc").await;
        session.mkdir(p("/d"), 0o755).await.unwrap();

        session.link(p("/f"), p("/g")).await.unwrap();
        let f = session.stat(p("/f")).await.unwrap();
        let g = session.stat(p("/g")).await.unwrap();
        assert_eq!(f.st_ino, g.st_ino);
        assert_eq!(g.st_nlink, 2);

        assert_eq!(session.link(p("/f"), p("/g")).await.err(), Some(Errno::EEXIST));
        assert_eq!(session.link(p("/d"), p("/e")).await.err(), Some(Errno::EISDIR));
        // an existing destination wins over a directory source
        assert_eq!(session.link(p("/d"), p("/g")).await.err(), Some(Errno::EEXIST));

        session.unlink(p("/f")).await.unwrap();
        assert_eq!(read_file(&session, "/g").await, b"abc");
        assert_eq!(session.stat(p("/g")).await.unwrap().st_nlink, 1);
    });
}

#[test]
fn statvfs_counts_objects() {
    block_on(async {
        let (_, session) = mount();
        session.mkdir(p("/d"), 0o755).await.unwrap();
        write_file(&session, "/d/f", b"x").await;

        let vfs = session.statvfs(p("/d/f")).await.unwrap();
        assert_eq!(vfs.f_files, 3);
        assert_eq!(vfs.f_namemax, 255);
        assert_eq!(vfs.f_bsize, 4096);
    });
}

#[test]
fn access_checks_owner_bits() {
    block_on(async {
        let (_, session) = mount();
        write_file(&session, "/f", b"x").await;
        session.chmod(p("/f"), 0o400).await.unwrap();

        assert_eq!(session.access(p("/f"), libc::R_OK).await, Ok(()));
        assert_eq!(session.access(p("/f"), libc::F_OK).await, Ok(()));
        assert_eq!(session.access(p("/f"), libc::W_OK).await, Err(Errno::EACCES));
        assert_eq!(
            session.access(p("/missing"), libc::F_OK).await,
            Err(Errno::ENOENT)
        );
    });
}

#[test]
fn attribute_mutation() {
    block_on(async {
        let (_, session) = mount();
        write_file(&session, "/f", b"x").await;
        session.symlink(p("/f"), p("/link")).await.unwrap();

        session.chmod(p("/link"), 0o600).await.unwrap();
        assert_eq!(session.stat(p("/f")).await.unwrap().st_mode, libc::S_IFREG | 0o600);

        session.chown(p("/f"), Some(1000), None).await.unwrap();
        let stat = session.stat(p("/f")).await.unwrap();
        assert_eq!((stat.st_uid, stat.st_gid), (1000, 0));

        session.lchown(p("/link"), None, Some(7)).await.unwrap();
        assert_eq!(session.lstat(p("/link")).await.unwrap().st_gid, 7);
        assert_eq!(session.stat(p("/link")).await.unwrap().st_gid, 0);

        let times = [Timespec::new(10, 1), Timespec::new(20, 2)];
        session.utimens(p("/f"), times).await.unwrap();
        let stat = session.stat(p("/f")).await.unwrap();
        assert_eq!((stat.st_atime, stat.st_atime_nsec), (10, 1));
        assert_eq!((stat.st_mtime, stat.st_mtime_nsec), (20, 2));

        let fd = session.open(p("/f"), libc::O_RDWR).await.unwrap();
        fd.fchmod(0o644).await.unwrap();
        fd.futimens([Timespec::new(1, 0), Timespec::new(2, 0)]).await.unwrap();
        let stat = fd.fstat().await.unwrap();
        assert_eq!(stat.st_mode, libc::S_IFREG | 0o644);
        assert_eq!(stat.st_mtime, 2);
        fd.close().await.unwrap();
    });
}

#[test]
fn xattr_value_sizes() {
    block_on(async {
        let (_, session) = mount();
        write_file(&session, "/f", b"").await;
        session.setxattr(p("/f"), "user.tag", b"blue", 0).await.unwrap();

        let mut empty: [u8; 0] = [];
        assert_eq!(session.getxattr(p("/f"), "user.tag", &mut empty).await, Ok(4));

        let mut small = [0xaa_u8; 2];
        assert_eq!(
            session.getxattr(p("/f"), "user.tag", &mut small).await,
            Err(Errno::ERANGE)
        );
        assert_eq!(small, [0xaa; 2]);

        let mut buf = [0_u8; 16];
        assert_eq!(session.getxattr(p("/f"), "user.tag", &mut buf).await, Ok(4));
        assert_eq!(&buf[..4], b"blue");

        assert_eq!(
            session.getxattr(p("/f"), "user.none", &mut buf).await,
            Err(Errno::ENODATA)
        );
        session.setxattr(p("/f"), "user.empty", b"", 0).await.unwrap();
        assert_eq!(session.getxattr(p("/f"), "user.empty", &mut buf).await, Ok(0));
    });
}

#[test]
fn xattr_flags_and_removal() {
    block_on(async {
        let (_, session) = mount();
        write_file(&session, "/f", b"").await;
        session.setxattr(p("/f"), "user.a", b"1", XATTR_CREATE).await.unwrap();

        assert_eq!(
            session.setxattr(p("/f"), "user.a", b"2", XATTR_CREATE).await,
            Err(Errno::EEXIST)
        );
        assert_eq!(
            session.setxattr(p("/f"), "user.b", b"2", XATTR_REPLACE).await,
            Err(Errno::ENODATA)
        );
        session.setxattr(p("/f"), "user.a", b"3", XATTR_REPLACE).await.unwrap();
        session.setxattr(p("/f"), "user.b", b"4", 0).await.unwrap();

        let mut empty: [u8; 0] = [];
        let len = session.listxattr(p("/f"), &mut empty).await.unwrap();
        assert_eq!(len, b"user.a\0user.b\0".len());
        let mut list = vec![0_u8; len];
        assert_eq!(session.listxattr(p("/f"), &mut list).await, Ok(len));
        assert_eq!(list, b"user.a\0user.b\0");

        session.removexattr(p("/f"), "user.a").await.unwrap();
        assert_eq!(session.removexattr(p("/f"), "user.a").await, Err(Errno::ENODATA));
        assert_eq!(
            session.setxattr(p("/f"), "user.a\0b", b"", 0).await,
            Err(Errno::EINVAL)
        );
    });
}

#[test]
fn xattr_on_symlink_itself() {
    block_on(async {
        let (_, session) = mount();
        write_file(&session, "/f", b"").await;
        session.symlink(p("/f"), p("/link")).await.unwrap();

        session.lsetxattr(p("/link"), "user.own", b"l", 0).await.unwrap();
        session.setxattr(p("/link"), "user.target", b"t", 0).await.unwrap();

        let mut buf = [0_u8; 8];
        assert_eq!(session.lgetxattr(p("/link"), "user.own", &mut buf).await, Ok(1));
        assert_eq!(
            session.getxattr(p("/link"), "user.own", &mut buf).await,
            Err(Errno::ENODATA)
        );
        assert_eq!(session.getxattr(p("/f"), "user.target", &mut buf).await, Ok(1));

        let fd = session.open(p("/f"), libc::O_RDONLY).await.unwrap();
        assert_eq!(fd.fgetxattr("user.target", &mut buf).await, Ok(1));
        fd.fsetxattr("user.fd", b"xyz", 0).await.unwrap();
        fd.fremovexattr("user.target").await.unwrap();
        let mut list = [0_u8; 64];
        let len = fd.flistxattr(&mut list).await.unwrap();
        assert_eq!(&list[..len], b"user.fd\0");
        fd.close().await.unwrap();

        session.lremovexattr(p("/link"), "user.own").await.unwrap();
        let mut empty: [u8; 0] = [];
        assert_eq!(session.llistxattr(p("/link"), &mut empty).await, Ok(0));
    });
}

#[test]
fn no_active_target() {
    block_on(async {
        let session = async_glfs::Session::builder().build();
        assert_eq!(session.generation(), 0);
        assert_eq!(session.stat(p("/")).await.err(), Some(Errno::EIO));
        assert_eq!(session.mkdir(p("/d"), 0o755).await.err(), Some(Errno::EIO));
        assert_eq!(session.opendir(p("/")).await.err(), Some(Errno::EIO));

        let volume = std::sync::Arc::new(memvol::MemVolume::new("late"));
        assert_eq!(session.switch_subvol(volume), 1);
        session.mkdir(p("/d"), 0o755).await.unwrap();

        assert_eq!(session.unset_subvol(), 2);
        assert_eq!(session.stat(p("/d")).await.err(), Some(Errno::EIO));
    });
}

#[test]
fn switching_targets() {
    block_on(async {
        let (_, session) = mount();
        assert_eq!(session.generation(), 1);
        session.mkdir(p("/old"), 0o755).await.unwrap();

        let other = std::sync::Arc::new(memvol::MemVolume::new("other"));
        assert_eq!(session.switch_subvol(other), 2);
        assert_eq!(session.stat(p("/old")).await.err(), Some(Errno::ENOENT));
    });
}
