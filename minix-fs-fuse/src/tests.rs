use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use minix_fs::{ReentrantLock, Scheduler, WaitQueue};

use super::*;

#[test]
fn task_ids_follow_threads() {
    let scheduler = Arc::new(ThreadScheduler::new());
    let main = scheduler.current_task();
    assert_eq!(scheduler.current_task(), main);

    let other = {
        let scheduler = scheduler.clone();
        thread::spawn(move || scheduler.current_task()).join().unwrap()
    };
    assert_ne!(main, other);
}

#[test]
fn unblock_before_block_is_not_lost() {
    let scheduler = ThreadScheduler::new();
    let me = scheduler.current_task();
    scheduler.unblock(me);
    // 许可已经存在，立即返回
    scheduler.block_current();
}

#[test]
fn reentrant_lock_nests_for_owner() {
    let scheduler = ThreadScheduler::new();
    let lock = ReentrantLock::new();

    let outer = lock.lock(&scheduler);
    let inner = lock.lock(&scheduler);
    drop(inner);
    assert!(lock.is_locked());
    drop(outer);
    assert!(!lock.is_locked());
}

#[test]
fn reentrant_lock_excludes_other_tasks() {
    let scheduler = Arc::new(ThreadScheduler::new());
    let lock = Arc::new(ReentrantLock::new());
    let entered = Arc::new(AtomicBool::new(false));
    let barrier = Arc::new(Barrier::new(2));

    let guard = lock.lock(&*scheduler);
    let handle = {
        let (scheduler, lock, entered, barrier) =
            (scheduler.clone(), lock.clone(), entered.clone(), barrier.clone());
        thread::spawn(move || {
            barrier.wait();
            let _guard = lock.lock(&*scheduler);
            entered.store(true, Ordering::SeqCst);
        })
    };

    barrier.wait();
    thread::sleep(Duration::from_millis(50));
    assert!(!entered.load(Ordering::SeqCst));

    drop(guard);
    handle.join().unwrap();
    assert!(entered.load(Ordering::SeqCst));
    assert!(!lock.is_locked());
}

#[test]
fn wait_queue_wakes_in_arrival_order() {
    let scheduler = Arc::new(ThreadScheduler::new());
    let queue = Arc::new(WaitQueue::new());
    let (tx, rx) = mpsc::channel();

    let mut handles = Vec::new();
    for i in 0..3 {
        let (scheduler, queue, tx) = (scheduler.clone(), queue.clone(), tx.clone());
        handles.push(thread::spawn(move || {
            let me = scheduler.current_task();
            queue.enqueue(me);
            tx.send(("queued", i)).unwrap();
            scheduler.block_current();
            tx.send(("woken", i)).unwrap();
        }));
        // 逐个登记，保证先后次序
        assert_eq!(rx.recv().unwrap(), ("queued", i));
    }
    assert_eq!(queue.len(), 3);

    for i in 0..3 {
        assert!(queue.wake_one(&*scheduler));
        assert_eq!(rx.recv().unwrap(), ("woken", i));
    }
    assert!(queue.is_empty());
    assert!(!queue.wake_one(&*scheduler));

    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn enqueue_is_idempotent() {
    let scheduler = ThreadScheduler::new();
    let queue = WaitQueue::new();
    let me = scheduler.current_task();
    queue.enqueue(me);
    queue.enqueue(me);
    assert_eq!(queue.len(), 1);
}

#[test]
fn mem_disk_rejects_bad_requests() {
    let disk = MemDisk::new(4);
    let mut buf = [0; SECTOR_SIZE];
    assert_eq!(disk.read_sectors(4, &mut buf), Err(IoError::OutOfRange));
    assert_eq!(disk.read_sectors(0, &mut buf[..100]), Err(IoError::Misaligned));

    disk.write_sectors(3, &[7; SECTOR_SIZE]).unwrap();
    assert_eq!(disk.peek(3 * SECTOR_SIZE, 2), [7, 7]);
    assert_eq!(disk.writes(), 1);
    assert_eq!(disk.reads(), 0);
}

#[test]
fn removed_task_is_not_woken() {
    let scheduler = Arc::new(ThreadScheduler::new());
    let queue = WaitQueue::new();
    let me = scheduler.current_task();
    let other = {
        let scheduler = scheduler.clone();
        thread::spawn(move || scheduler.current_task()).join().unwrap()
    };

    queue.enqueue(me);
    queue.enqueue(other);
    // 自己已经拿到资源，撤销登记，唤醒应落到 other 身上
    queue.remove(me);
    assert_eq!(queue.len(), 1);
    queue.remove(me);
    assert_eq!(queue.len(), 1);

    assert!(queue.wake_one(&*scheduler));
    assert!(queue.is_empty());
}
