mod common;

use minix_fs::{OpenFlag, Process};
use vfs::{DirEntryType, Error};

fn touch(process: &mut Process, path: &str) {
    let fd = process.creat(path, 0o644).unwrap();
    process.close(fd).unwrap();
}

fn names(process: &mut Process, path: &str) -> Vec<(String, DirEntryType)> {
    let fd = process.open(path, OpenFlag::read_only(), 0).unwrap();
    let mut names = Vec::new();
    while let Some(entry) = process.readdir(fd).unwrap() {
        names.push((entry.name, entry.ty));
    }
    process.close(fd).unwrap();
    names
}

#[test]
fn new_directory_has_dot_entries() {
    let (mut process, _disk, _dev) = common::root_process(512, 0);
    process.mkdir("/a", 0o755).unwrap();

    let a = process.stat("/a").unwrap();
    assert_eq!(a.kind, DirEntryType::Directory);
    assert_eq!(a.nlinks, 2);
    assert_eq!(a.size, 32);
    assert_eq!(process.stat("/a/.").unwrap().ino, a.ino);
    assert_eq!(process.stat("/a/..").unwrap().ino, 1);
    // 子目录的`..`计入父目录的链接数
    assert_eq!(process.stat("/").unwrap().nlinks, 3);

    assert_eq!(
        names(&mut process, "/a"),
        [
            (".".to_string(), DirEntryType::Directory),
            ("..".to_string(), DirEntryType::Directory),
        ]
    );
}

#[test]
fn unlink_leaves_a_hole() {
    let (mut process, _disk, _dev) = common::root_process(512, 0);
    touch(&mut process, "/x");
    touch(&mut process, "/y");
    let size = process.stat("/").unwrap().size;
    assert_eq!(size, 4 * 16);

    process.unlink("/x").unwrap();
    assert_eq!(process.stat("/").unwrap().size, size);
    assert_eq!(process.stat("/x").err(), Some(Error::NotFound));

    let listed: Vec<_> = names(&mut process, "/").into_iter().map(|(name, _)| name).collect();
    assert_eq!(listed, [".", "..", "y"]);

    // 新项追加在末尾，不复用空出的位置
    touch(&mut process, "/z");
    assert_eq!(process.stat("/").unwrap().size, size + 16);
    let listed: Vec<_> = names(&mut process, "/").into_iter().map(|(name, _)| name).collect();
    assert_eq!(listed, [".", "..", "y", "z"]);
}

#[test]
fn directory_grows_past_one_block() {
    let (mut process, _disk, _dev) = common::root_process(512, 200);
    for i in 0..70 {
        touch(&mut process, &format!("/f{i}"));
    }
    assert_eq!(process.stat("/").unwrap().size, 72 * 16);
    assert!(process.stat("/f69").is_ok());
    assert_eq!(names(&mut process, "/").len(), 72);
}

#[test]
fn name_length_limit() {
    let (mut process, _disk, _dev) = common::root_process(512, 0);
    let longest = "abcdefghijklmn";
    touch(&mut process, &format!("/{longest}"));
    assert!(process.stat(&format!("/{longest}")).is_ok());
    assert!(names(&mut process, "/").iter().any(|(name, _)| name == longest));

    assert_eq!(
        process.creat("/abcdefghijklmno", 0o644).err(),
        Some(Error::NameTooLong)
    );
    assert_eq!(process.stat("/abcdefghijklmno").err(), Some(Error::NameTooLong));
}

#[test]
fn path_forms() {
    let (mut process, _disk, _dev) = common::root_process(512, 0);
    process.mkdir("/a", 0o755).unwrap();
    process.mkdir("/a/b", 0o755).unwrap();
    let b = process.stat("/a/b").unwrap().ino;

    assert_eq!(process.stat("//a///b/").unwrap().ino, b);
    assert_eq!(process.stat("/a/./b/../b").unwrap().ino, b);
    // 根目录的`..`仍是根目录
    assert_eq!(process.stat("/../..").unwrap().ino, 1);
    assert_eq!(process.stat("").err(), Some(Error::NotFound));

    touch(&mut process, "/a/file");
    assert_eq!(process.stat("/a/file/x").err(), Some(Error::NotADirectory));
    assert_eq!(process.stat("/nope/x").err(), Some(Error::NotFound));
}

#[test]
fn relative_paths_follow_cwd() {
    let (mut process, _disk, _dev) = common::root_process(512, 0);
    process.mkdir("/a", 0o755).unwrap();
    process.mkdir("/a/b", 0o755).unwrap();

    process.chdir("/a/b").unwrap();
    assert_eq!(process.getcwd(), "/a/b");
    touch(&mut process, "here");
    assert!(process.stat("/a/b/here").is_ok());

    process.chdir("..").unwrap();
    assert_eq!(process.getcwd(), "/a");
    assert!(process.stat("b/here").is_ok());

    touch(&mut process, "/a/plain");
    assert_eq!(process.chdir("plain"), Err(Error::NotADirectory));
    assert_eq!(process.getcwd(), "/a");
}

#[test]
fn chroot_confines_lookups() {
    let (mut process, _disk, _dev) = common::root_process(512, 0);
    process.mkdir("/jail", 0o755).unwrap();
    touch(&mut process, "/jail/inside");
    let jail = process.stat("/jail").unwrap().ino;

    process.chroot("/jail").unwrap();
    assert_eq!(process.stat("/").unwrap().ino, jail);
    assert_eq!(process.stat("/..").unwrap().ino, jail);
    assert!(process.stat("/inside").is_ok());
    assert_eq!(process.stat("/jail").err(), Some(Error::NotFound));
}

#[test]
fn hard_links_share_the_inode() {
    let (mut process, _disk, _dev) = common::root_process(512, 0);
    let fd = process.creat("/orig", 0o644).unwrap();
    process.write(fd, b"shared").unwrap();
    process.close(fd).unwrap();

    process.link("/orig", "/alias").unwrap();
    let orig = process.stat("/orig").unwrap();
    assert_eq!(orig.nlinks, 2);
    assert_eq!(process.stat("/alias").unwrap().ino, orig.ino);

    process.unlink("/orig").unwrap();
    assert_eq!(process.stat("/alias").unwrap().nlinks, 1);
    let fd = process.open("/alias", OpenFlag::read_only(), 0).unwrap();
    let mut buf = [0; 16];
    let n = process.read(fd, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"shared");

    assert_eq!(process.link("/alias", "/alias"), Err(Error::AlreadyExists));
    assert_eq!(process.link("/missing", "/x"), Err(Error::NotFound));
}

#[test]
fn directories_cannot_be_linked_or_unlinked() {
    let (process, _disk, _dev) = common::root_process(512, 0);
    process.mkdir("/d", 0o755).unwrap();
    assert_eq!(process.link("/d", "/e"), Err(Error::IsADirectory));
    assert_eq!(process.unlink("/d"), Err(Error::IsADirectory));
    assert_eq!(process.unlink("/d/.."), Err(Error::IsADirectory));
}

#[test]
fn rmdir_checks() {
    let (mut process, _disk, _dev) = common::root_process(512, 0);
    process.mkdir("/d", 0o755).unwrap();
    touch(&mut process, "/d/f");
    touch(&mut process, "/plain");

    assert_eq!(process.rmdir("/"), Err(Error::InvalidArgument));
    assert_eq!(process.rmdir("/d/."), Err(Error::InvalidArgument));
    assert_eq!(process.rmdir("/missing"), Err(Error::NotFound));
    assert_eq!(process.rmdir("/plain"), Err(Error::NotADirectory));
    assert_eq!(process.rmdir("/d"), Err(Error::DirectoryNotEmpty));

    process.unlink("/d/f").unwrap();
    process.chdir("/d").unwrap();
    assert_eq!(process.rmdir("/d"), Err(Error::Busy));

    process.chdir("/").unwrap();
    process.rmdir("/d").unwrap();
    assert_eq!(process.stat("/").unwrap().nlinks, 2);
    assert_eq!(process.stat("/d").err(), Some(Error::NotFound));
}

#[test]
fn rmdir_frees_the_inode() {
    let (process, _disk, dev) = common::root_process(512, 0);
    process.mkdir("/d", 0o755).unwrap();
    let nr = process.stat("/d").unwrap().ino as u32;
    process.rmdir("/d").unwrap();

    let fs = process.fs();
    let inode = fs.get_inode(dev, nr).unwrap();
    assert_eq!(inode.mode(), 0);
    drop(inode);
    assert_eq!(fs.allocate_inode(dev), Some(nr));
}

#[test]
fn open_flags_on_existing_names() {
    let (mut process, _disk, _dev) = common::root_process(512, 0);
    touch(&mut process, "/f");
    process.mkdir("/d", 0o755).unwrap();

    assert_eq!(
        process.open("/f", OpenFlag::CREATE | OpenFlag::EXCL | OpenFlag::WRONLY, 0o644).err(),
        Some(Error::AlreadyExists)
    );
    assert_eq!(process.open("/d", OpenFlag::WRONLY.into(), 0).err(), Some(Error::IsADirectory));
    assert_eq!(process.open("/d", OpenFlag::RDWR.into(), 0).err(), Some(Error::IsADirectory));
    assert!(process.open("/d", OpenFlag::read_only(), 0).is_ok());
    assert_eq!(process.mkdir("/f", 0o755), Err(Error::AlreadyExists));

    let fd = process.open("/f", OpenFlag::read_only(), 0).unwrap();
    assert_eq!(process.readdir(fd).err(), Some(Error::NotADirectory));
}

#[test]
fn unlinked_open_file_lives_until_close() {
    let (mut process, _disk, dev) = common::root_process(512, 0);
    let fd = process.open("/tmpfile", OpenFlag::CREATE | OpenFlag::RDWR, 0o600).unwrap();
    process.write(fd, &[1; 3000]).unwrap();
    let nr = process.fstat(fd).unwrap().ino as u32;

    process.unlink("/tmpfile").unwrap();
    assert_eq!(process.fstat(fd).unwrap().nlinks, 0);

    process.lseek(fd, 0, minix_fs::Whence::Set).unwrap();
    let mut buf = [0; 3000];
    assert_eq!(process.read(fd, &mut buf).unwrap(), 3000);
    assert!(buf.iter().all(|&b| b == 1));

    process.close(fd).unwrap();
    let fs = process.fs();
    assert_eq!(fs.get_inode(dev, nr).unwrap().mode(), 0);
}
