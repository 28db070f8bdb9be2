mod common;

use minix_fs::layout::{INDEX_ENTRIES, MAX_FILE_BLOCKS};
use minix_fs::{BLOCK_SIZE, OpenFlag, Whence};
use vfs::Error;

fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

#[test]
fn round_trip_across_indirection_levels() {
    let (mut process, _disk, _dev) = common::root_process(4096, 0);
    let fd = process.open("/data", OpenFlag::CREATE | OpenFlag::RDWR, 0o644).unwrap();

    // 直接块、一级间接块、二级间接块
    for (i, offset) in [0, 7 * BLOCK_SIZE, (7 + INDEX_ENTRIES) * BLOCK_SIZE]
        .into_iter()
        .enumerate()
    {
        let data = pattern(3000, i as u8);
        process.lseek(fd, offset as i64, Whence::Set).unwrap();
        assert_eq!(process.write(fd, &data).unwrap(), data.len());

        let mut back = vec![0; data.len()];
        process.lseek(fd, offset as i64, Whence::Set).unwrap();
        assert_eq!(process.read(fd, &mut back).unwrap(), data.len());
        assert_eq!(back, data);
    }

    let stat = process.fstat(fd).unwrap();
    assert_eq!(stat.size as usize, (7 + INDEX_ENTRIES) * BLOCK_SIZE + 3000);
}

#[test]
fn holes_read_as_zeros() {
    let (mut process, _disk, _dev) = common::root_process(1024, 0);
    let fd = process.open("/sparse", OpenFlag::CREATE | OpenFlag::RDWR, 0o644).unwrap();

    process.lseek(fd, 10 * BLOCK_SIZE as i64, Whence::Set).unwrap();
    process.write(fd, b"tail").unwrap();

    let mut head = vec![0xff; 2 * BLOCK_SIZE];
    process.lseek(fd, 0, Whence::Set).unwrap();
    assert_eq!(process.read(fd, &mut head).unwrap(), head.len());
    assert!(head.iter().all(|&b| b == 0));
}

#[test]
fn read_stops_at_end_of_file() {
    let (mut process, _disk, _dev) = common::root_process(1024, 0);
    let fd = process.open("/short", OpenFlag::CREATE | OpenFlag::RDWR, 0o644).unwrap();
    process.write(fd, b"hello").unwrap();

    let mut buf = [0; 16];
    process.lseek(fd, 2, Whence::Set).unwrap();
    assert_eq!(process.read(fd, &mut buf).unwrap(), 3);
    assert_eq!(&buf[..3], b"llo");
    assert_eq!(process.read(fd, &mut buf).unwrap(), 0);
}

#[test]
fn truncate_frees_blocks_and_is_idempotent() {
    let (mut process, _disk, dev) = common::root_process(4096, 0);
    let fs = process.fs().clone();

    let fd = process.open("/big", OpenFlag::CREATE | OpenFlag::RDWR, 0o644).unwrap();
    process.lseek(fd, ((7 + INDEX_ENTRIES) * BLOCK_SIZE) as i64, Whence::Set).unwrap();
    process.write(fd, &pattern(2 * BLOCK_SIZE, 9)).unwrap();
    process.close(fd).unwrap();

    let stat = process.stat("/big").unwrap();
    let inode = fs.get_inode(dev, stat.ino as u32).unwrap();
    let zones = inode.on_disk(|d| d.zone);
    assert_ne!(zones[8], 0);
    assert!(fs.block_in_use(dev, zones[8] as u32));

    inode.truncate();
    assert_eq!(inode.size(), 0);
    assert_eq!(inode.on_disk(|d| d.zone), [0; 9]);
    assert!(!fs.block_in_use(dev, zones[8] as u32));

    inode.truncate();
    assert_eq!(inode.size(), 0);
    assert_eq!(inode.on_disk(|d| d.zone), [0; 9]);
}

#[test]
fn open_with_truncate_empties_regular_file() {
    let (mut process, _disk, _dev) = common::root_process(1024, 0);
    let fd = process.creat("/log", 0o644).unwrap();
    process.write(fd, &[1; 5000]).unwrap();
    process.close(fd).unwrap();

    let fd = process.open("/log", OpenFlag::TRUNC.into(), 0).unwrap();
    assert_eq!(process.fstat(fd).unwrap().size, 0);
}

#[test]
fn append_writes_at_end() {
    let (mut process, _disk, _dev) = common::root_process(1024, 0);
    let fd = process.creat("/journal", 0o644).unwrap();
    process.write(fd, b"one;").unwrap();
    process.close(fd).unwrap();

    let fd = process.open("/journal", OpenFlag::WRONLY | OpenFlag::APPEND, 0).unwrap();
    process.lseek(fd, 0, Whence::Set).unwrap();
    process.write(fd, b"two;").unwrap();
    process.close(fd).unwrap();

    let fd = process.open("/journal", OpenFlag::read_only(), 0).unwrap();
    let mut buf = [0; 16];
    assert_eq!(process.read(fd, &mut buf).unwrap(), 8);
    assert_eq!(&buf[..8], b"one;two;");
    assert_eq!(process.lseek(fd, -4, Whence::End).unwrap(), 4);
    assert_eq!(process.lseek(fd, -5, Whence::Current), Err(Error::InvalidArgument));
}

#[test]
fn access_mode_is_enforced_per_descriptor() {
    let (mut process, _disk, _dev) = common::root_process(1024, 0);
    let fd = process.creat("/wo", 0o644).unwrap();
    assert_eq!(process.read(fd, &mut [0; 4]), Err(Error::BadDescriptor));
    process.close(fd).unwrap();

    let fd = process.open("/wo", OpenFlag::read_only(), 0).unwrap();
    assert_eq!(process.write(fd, b"x"), Err(Error::BadDescriptor));
    assert_eq!(process.close(fd), Ok(()));
    assert_eq!(process.close(fd), Err(Error::BadDescriptor));
}

#[test]
fn writing_past_the_largest_file_fails() {
    let (mut process, _disk, _dev) = common::root_process(1024, 0);
    let fd = process.creat("/huge", 0o644).unwrap();
    process.lseek(fd, (MAX_FILE_BLOCKS * BLOCK_SIZE) as i64, Whence::Set).unwrap();
    assert_eq!(process.write(fd, b"x"), Err(Error::FileTooLarge));
}

#[test]
fn full_device_gives_short_write() {
    let (mut process, _disk, _dev) = common::root_process(128, 16);
    let fd = process.creat("/fill", 0o644).unwrap();

    let data = vec![7; 256 * BLOCK_SIZE];
    let written = process.write(fd, &data).unwrap();
    assert!(written > 0 && written < data.len());
    assert_eq!(written % BLOCK_SIZE, 0);
    assert_eq!(process.fstat(fd).unwrap().size as usize, written);
    assert_eq!(process.write(fd, b"more"), Err(Error::NoSpace));
}

#[test]
fn dup_shares_offset() {
    let (mut process, _disk, _dev) = common::root_process(1024, 0);
    let fd = process.open("/shared", OpenFlag::CREATE | OpenFlag::RDWR, 0o644).unwrap();
    let copy = process.dup(fd).unwrap();
    assert_ne!(fd, copy);

    process.write(fd, b"abc").unwrap();
    process.write(copy, b"def").unwrap();
    assert_eq!(process.lseek(fd, 0, Whence::Current).unwrap(), 6);

    assert_eq!(process.dup2(fd, 9).unwrap(), 9);
    process.lseek(9, 0, Whence::Set).unwrap();
    let mut buf = [0; 6];
    process.read(fd, &mut buf).unwrap();
    assert_eq!(&buf, b"abcdef");
}

/// 回显设备：写入的字节原样读回
#[derive(Default)]
struct Echo(std::sync::Mutex<std::collections::VecDeque<u8>>);

impl block_dev::CharDevice for Echo {
    fn read(&self, buf: &mut [u8]) -> usize {
        let mut queue = self.0.lock().unwrap();
        let n = buf.len().min(queue.len());
        for (byte, b) in buf.iter_mut().zip(queue.drain(..n)) {
            *byte = b;
        }
        n
    }

    fn write(&self, buf: &[u8]) -> usize {
        self.0.lock().unwrap().extend(buf);
        buf.len()
    }
}

#[test]
fn char_device_goes_to_driver() {
    let (mut process, _disk, _dev) = common::root_process(256, 0);
    let tty = process.fs().devices().install_char(std::sync::Arc::new(Echo::default()));
    process.mknod("/tty", vfs::mode::IFCHR | 0o666, tty).unwrap();

    let fd = process.open("/tty", OpenFlag::RDWR.into(), 0).unwrap();
    assert_eq!(process.write(fd, b"echo").unwrap(), 4);
    let mut buf = [0; 8];
    assert_eq!(process.read(fd, &mut buf).unwrap(), 4);
    assert_eq!(&buf[..4], b"echo");
    // 设备文件本身没有数据
    assert_eq!(process.stat("/tty").unwrap().size, 0);
}

#[test]
fn block_device_file_addresses_raw_bytes() {
    let (mut process, _disk, _dev) = common::root_process(256, 0);
    let (raw, dev) = common::disk(process.fs(), 8);
    process.mknod("/hd1", vfs::mode::IFBLK | 0o600, dev).unwrap();

    let fd = process.open("/hd1", OpenFlag::RDWR.into(), 0).unwrap();
    process.lseek(fd, 1000, Whence::Set).unwrap();
    let data = pattern(2000, 3);
    assert_eq!(process.write(fd, &data).unwrap(), 2000);
    process.sync();
    assert_eq!(raw.peek(1000, 2000), data);

    process.lseek(fd, 1000, Whence::Set).unwrap();
    let mut buf = vec![0; 2000];
    assert_eq!(process.read(fd, &mut buf).unwrap(), 2000);
    assert_eq!(buf, data);

    // 设备末尾
    process.lseek(fd, 8 * 1024 - 10, Whence::Set).unwrap();
    assert_eq!(process.write(fd, &[1; 100]).unwrap(), 10);
    assert_eq!(process.write(fd, &[1; 100]), Err(Error::NoSpace));
    assert_eq!(process.read(fd, &mut buf).unwrap(), 0);
}
