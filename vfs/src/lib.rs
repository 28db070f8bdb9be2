#![no_std]

extern crate alloc;

mod dirent;
mod error;
pub mod mode;
mod stat;

pub use self::{
    dirent::{DirEntry, DirEntryType},
    error::Error,
    stat::Stat,
};
