//! Directory trees for tests. Each fixture has an on-disk form, for
//! [`TempWorkspace::with_fixture`](crate::TempWorkspace::with_fixture), and
//! an in-memory form that seeds a [`FakeFs`].

use std::fs;
use std::path::Path;

use crate::fake_fs::FakeFs;

/// `hello.txt` plus a couple of nested files.
pub fn small_tree(root: &Path) {
    fs::write(root.join("hello.txt"), "hello world").unwrap();
    fs::write(root.join("empty.txt"), "").unwrap();
    fs::create_dir_all(root.join("docs/notes")).unwrap();
    fs::write(root.join("docs/readme.md"), "# readme").unwrap();
    fs::write(root.join("docs/notes/todo.txt"), "buy milk").unwrap();

    let script_path = root.join("run.sh");
    fs::write(&script_path, "#!/bin/sh\necho ok").unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&script_path, fs::Permissions::from_mode(0o755)).unwrap();
    }
}

/// The in-memory counterpart of [`small_tree`].
pub fn small_fake() -> FakeFs {
    let fake = FakeFs::new();
    fake.add_file("hello.txt", "hello world")
        .add_file("empty.txt", "")
        .add_file("docs/readme.md", "# readme")
        .add_file("docs/notes/todo.txt", "buy milk")
        .add_file("run.sh", "#!/bin/sh\necho ok");
    fake
}

/// A regular file and a relative symlink to it.
pub fn symlink_tree(root: &Path) {
    fs::write(root.join("target.txt"), "symlink target content").unwrap();
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink("target.txt", root.join("link.txt")).unwrap();
    }
}

/// Five leaf directories four levels down, three files each.
pub fn deep_tree(root: &Path) {
    for i in 0..5 {
        let dir = root.join(format!("level0/level1/level2/level3/level4_{i}"));
        fs::create_dir_all(&dir).unwrap();
        for j in 0..3 {
            fs::write(dir.join(format!("file_{j}.txt")), format!("content {i}/{j}")).unwrap();
        }
    }
}
