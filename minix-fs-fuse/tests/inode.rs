mod common;

use std::sync::{Arc, Barrier};
use std::thread;

use minix_fs::{OpenFlag, Process};

/// 新建一个带数据的文件，返回索引节点号
fn file_with_data(process: &mut Process, path: &str) -> u32 {
    let fd = process.open(path, OpenFlag::CREATE | OpenFlag::RDWR, 0o644).unwrap();
    process.write(fd, &[9; 2000]).unwrap();
    let nr = process.fstat(fd).unwrap().ino as u32;
    process.close(fd).unwrap();
    nr
}

#[test]
fn references_share_one_table_entry() {
    let (mut process, _disk, dev) = common::root_process(512, 0);
    let nr = file_with_data(&mut process, "/f");
    let fs = process.fs().clone();
    let sb = fs.super_block(dev).unwrap();
    let (live, sb_live) = (fs.live_inodes(), sb.live_inodes());

    let a = fs.get_inode(dev, nr).unwrap();
    let b = fs.get_inode(dev, nr).unwrap();
    assert!(a.same(&b));
    assert_eq!(a.ref_count(), 2);
    assert_eq!(fs.live_inodes(), live + 1);
    assert_eq!(sb.live_inodes(), sb_live + 1);

    let c = b.clone();
    assert_eq!(a.ref_count(), 3);
    assert_eq!(fs.live_inodes(), live + 1);

    drop(b);
    drop(c);
    assert_eq!(a.ref_count(), 1);
    assert_eq!(sb.live_inodes(), sb_live + 1);

    drop(a);
    assert_eq!(fs.live_inodes(), live);
    assert_eq!(sb.live_inodes(), sb_live);

    // 重新取得时从磁盘读入，内容不变
    let again = fs.get_inode(dev, nr).unwrap();
    assert_eq!(again.ref_count(), 1);
    assert_eq!(again.size(), 2000);
}

#[test]
fn last_of_concurrent_drops_reclaims_unlinked_inode() {
    let (mut process, _disk, dev) = common::root_process(512, 0);
    let fs = process.fs().clone();

    for _ in 0..200 {
        let nr = file_with_data(&mut process, "/victim");
        let a = fs.get_inode(dev, nr).unwrap();
        let b = a.clone();
        let block = a.map_block(0, false).unwrap().unwrap();
        process.unlink("/victim").unwrap();
        assert_eq!(a.nlinks(), 0);

        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = [a, b]
            .into_iter()
            .map(|inode| {
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    drop(inode);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(fs.get_inode(dev, nr).unwrap().mode(), 0);
        assert!(!fs.block_in_use(dev, block));
    }
}
