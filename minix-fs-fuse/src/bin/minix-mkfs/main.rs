mod cli;

use std::fs::{self, OpenOptions};
use std::io;
use std::sync::{Arc, Mutex};

use clap::Parser;
use cli::Cli;
use minix_fs::{Config, FileSystem, NAME_LEN, Process};
use minix_fs_fuse::BlockFile;
use typed_bytesize::ByteSizeIec;

fn main() -> io::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let disk_size = ByteSizeIec::mib(cli.size_mib).0;
    let fd = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(&cli.out)?;
    fd.set_len(disk_size)?;

    let fs = minix_fs_fuse::host_fs(Config::default());
    let dev = fs.devices().install_block(Arc::new(BlockFile(Mutex::new(fd))));
    fs.format(dev, cli.inodes).map_err(fs_error)?;
    fs.mount_root(dev).map_err(fs_error)?;
    log::info!("{:?}: {disk_size} bytes formatted", cli.out);

    if let Some(source) = &cli.source {
        pack(&fs, source)?;
    }

    fs.sync();
    Ok(())
}

/// 把目录下的普通文件复制到根目录
fn pack(fs: &Arc<FileSystem>, source: &std::path::Path) -> io::Result<()> {
    let mut process = Process::new(fs).map_err(fs_error)?;

    for entry in fs::read_dir(source)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str().filter(|name| name.len() <= NAME_LEN) else {
            log::warn!("{name:?}: skipped, name is not a short UTF-8 name");
            continue;
        };

        let data = fs::read(entry.path())?;
        let fd = process.creat(&format!("/{name}"), 0o644).map_err(fs_error)?;
        let written = process.write(fd, &data).map_err(fs_error)?;
        process.close(fd).map_err(fs_error)?;
        if written < data.len() {
            return Err(io::Error::other(format!("{name}: image full")));
        }
        log::info!("file={name:?} size={written}");
    }

    Ok(())
}

fn fs_error(err: vfs::Error) -> io::Error {
    io::Error::other(err.to_string())
}
