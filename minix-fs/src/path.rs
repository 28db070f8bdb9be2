use alloc::string::String;
use alloc::vec::Vec;

pub trait Path {
    fn is_absolute(&self) -> bool;

    fn is_relative(&self) -> bool {
        !self.is_absolute()
    }

    /// 返回不以`/`结束、不包含相对项的绝对路径。
    ///
    /// # 参数
    ///
    /// `cwd`: 当前目录，为绝对路径。
    ///
    /// 连续的`/`视为一个，根目录的`..`仍是根目录。
    fn canonicalize(&self, cwd: &str) -> String;

    /// 返回路径的`(父目录, 文件名)`，文件名可能为空
    fn parent_file(&self) -> (&str, &str);

    /// 路径中非空的各项
    fn components(&self) -> impl Iterator<Item = &str>;
}

impl Path for str {
    fn is_absolute(&self) -> bool {
        self.starts_with('/')
    }

    fn canonicalize(&self, cwd: &str) -> String {
        let mut cmps = Vec::new();
        if self.is_relative() {
            cmps.extend(cwd.components());
        }

        for cmp in self.components() {
            match cmp {
                ".." => {
                    cmps.pop();
                }
                "." => (),
                s => cmps.push(s),
            }
        }

        if cmps.is_empty() {
            return String::from("/");
        }
        cmps.insert(0, ""); // 在接下来的拼接中代表根目录
        cmps.join("/")
    }

    fn parent_file(&self) -> (&str, &str) {
        match self.rsplit_once('/') {
            Some((parent, file)) => (parent, file),
            None => ("", self),
        }
    }

    fn components(&self) -> impl Iterator<Item = &str> {
        self.split('/').filter(|s| !s.is_empty())
    }
}
