//! 管道：以一页内存为环形缓冲区的索引节点
//!
//! 读端与写端共用一个活动索引节点，引用计数为 2 表示两端都打开。
//! 阻塞的读者与写者登记在管道上，有进展或另一端关闭时被唤醒。

use alloc::boxed::Box;

use vfs::Error;

use crate::{Inode, PAGE_SIZE, TaskId};

pub(crate) struct Pipe {
    page: Box<[u8; PAGE_SIZE]>,
    head: usize,
    len: usize,
    /// 等待数据的读者
    reader: Option<TaskId>,
    /// 等待空间的写者
    writer: Option<TaskId>,
}

enum Step {
    Done(usize),
    Progress(usize, Option<TaskId>),
    Wait,
}

impl Pipe {
    pub fn new() -> Self {
        Self {
            page: Box::new([0; PAGE_SIZE]),
            head: 0,
            len: 0,
            reader: None,
            writer: None,
        }
    }

    fn pop(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.len);
        for (i, byte) in buf[..n].iter_mut().enumerate() {
            *byte = self.page[(self.head + i) % PAGE_SIZE];
        }
        self.head = (self.head + n) % PAGE_SIZE;
        self.len -= n;
        n
    }

    fn push(&mut self, buf: &[u8]) -> usize {
        let n = buf.len().min(PAGE_SIZE - self.len);
        let tail = self.head + self.len;
        for (i, &byte) in buf[..n].iter().enumerate() {
            self.page[(tail + i) % PAGE_SIZE] = byte;
        }
        self.len += n;
        n
    }

    /// 取出全部登记的任务，一端关闭时调用
    pub fn take_waiters(&mut self) -> [Option<TaskId>; 2] {
        [self.reader.take(), self.writer.take()]
    }
}

impl Inode {
    /// 读出当前可读的字节；管道为空时阻塞，写端已关闭则返回 0
    pub(crate) fn pipe_read(&self, buf: &mut [u8]) -> Result<usize, Error> {
        if buf.is_empty() {
            return Ok(0);
        }
        let scheduler = self.fs().scheduler();
        let current = scheduler.current_task();

        loop {
            let step = self.with_pipe(|pipe, peers| {
                if pipe.len == 0 {
                    if peers < 2 {
                        return Step::Done(0);
                    }
                    pipe.reader = Some(current);
                    return Step::Wait;
                }
                Step::Progress(pipe.pop(buf), pipe.writer.take())
            });

            match step {
                Step::Done(n) => return Ok(n),
                Step::Progress(n, writer) => {
                    if let Some(writer) = writer {
                        scheduler.unblock(writer);
                    }
                    return Ok(n);
                }
                Step::Wait => scheduler.block_current(),
            }
        }
    }

    /// 写入全部字节，缓冲区满时阻塞；读端已关闭则失败
    pub(crate) fn pipe_write(&self, buf: &[u8]) -> Result<usize, Error> {
        let scheduler = self.fs().scheduler();
        let current = scheduler.current_task();

        let mut written = 0;
        while written < buf.len() {
            let step = self.with_pipe(|pipe, peers| {
                if peers < 2 {
                    return Step::Done(0);
                }
                match pipe.push(&buf[written..]) {
                    0 => {
                        pipe.writer = Some(current);
                        Step::Wait
                    }
                    n => Step::Progress(n, pipe.reader.take()),
                }
            });

            match step {
                Step::Done(_) if written == 0 => return Err(Error::BrokenPipe),
                Step::Done(_) => break,
                Step::Progress(n, reader) => {
                    if let Some(reader) = reader {
                        scheduler.unblock(reader);
                    }
                    written += n;
                }
                Step::Wait => scheduler.block_current(),
            }
        }

        Ok(written)
    }
}
