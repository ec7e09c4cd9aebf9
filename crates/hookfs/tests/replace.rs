//! Post-hooks that replace the delegate's outcome.

mod common;

use std::path::Path;

use hookfs_common::{Errno, FileLock, FileSystem, LockType};
use hookfs_interceptor::Operation;
use hookfs_test_support::fixtures;

use common::{PostScript, canned_attr, canned_listing, canned_lock, hooked};

const O_RDWR: u32 = 0o2;
const O_CREAT: u32 = 0o100;

#[test]
fn read_replacement_wins() {
    let fake = fixtures::small_fake();
    let (hook, fs) = hooked(&fake);
    hook.set_payload("HELLO");
    hook.script_post(Operation::Read, PostScript::Replace);

    let file = fs.open(Path::new("/hello.txt"), O_RDWR).unwrap();
    assert_eq!(file.read(5, 0).unwrap(), b"HELLO");
    // A different length is accepted.
    assert_eq!(file.read(2, 0).unwrap(), b"HELLO");
    file.release();
    assert_eq!(fake.calls("read"), 2);
}

#[test]
fn read_replacement_over_failure() {
    let fake = fixtures::small_fake();
    let (hook, fs) = hooked(&fake);
    hook.set_payload("recovered");
    hook.script_post(Operation::Read, PostScript::Replace);
    fake.fail("read", Errno::Io);

    let file = fs.open(Path::new("/hello.txt"), O_RDWR).unwrap();
    assert_eq!(file.read(9, 0).unwrap(), b"recovered");
    assert_eq!(hook.last_post_status(Operation::Read), Some(Err(Errno::Io)));
    file.release();
}

#[test]
fn write_replacement_reports_hook_count() {
    let fake = fixtures::small_fake();
    let (hook, fs) = hooked(&fake);
    hook.set_payload("12");
    hook.script_post(Operation::Write, PostScript::Replace);

    let file = fs.open(Path::new("/hello.txt"), O_RDWR).unwrap();
    assert_eq!(file.write(b"HELLO", 0).unwrap(), 2);
    file.release();
    // The delegate still wrote everything.
    assert_eq!(fake.contents("/hello.txt").unwrap(), b"HELLO world");
}

#[test]
fn error_replacement_over_success() {
    let fake = fixtures::small_fake();
    let (hook, fs) = hooked(&fake);
    hook.script_post(Operation::Unlink, PostScript::Fail(Errno::Busy));

    assert_eq!(fs.unlink(Path::new("/hello.txt")), Err(Errno::Busy));
    // The delegate ran; only the reported status changed.
    assert!(!fake.exists("/hello.txt"));
}

#[test]
fn success_replacement_over_failure() {
    let fake = fixtures::small_fake();
    let (hook, fs) = hooked(&fake);
    hook.script_post(Operation::Chmod, PostScript::Replace)
        .script_post(Operation::Mkdir, PostScript::Replace);

    fs.chmod(Path::new("/missing"), 0o644).unwrap();
    assert_eq!(hook.last_post_status(Operation::Chmod), Some(Err(Errno::NotFound)));
    fs.mkdir(Path::new("/docs"), 0o755).unwrap();
    assert_eq!(hook.last_post_status(Operation::Mkdir), Some(Err(Errno::Exists)));
}

#[test]
fn value_replacements() {
    let fake = fixtures::small_fake();
    let (hook, fs) = hooked(&fake);
    hook.set_payload("patched");
    for op in [
        Operation::GetAttr,
        Operation::GetXattr,
        Operation::ListXattr,
        Operation::Readlink,
        Operation::OpenDir,
    ] {
        hook.script_post(op, PostScript::Replace);
    }
    let hello = Path::new("/hello.txt");

    assert_eq!(fs.get_attr(hello).unwrap(), canned_attr());
    assert_eq!(fs.get_xattr(hello, "user.none").unwrap(), b"patched");
    assert_eq!(
        fs.list_xattr(hello).unwrap(),
        vec!["user.scripted".to_string()]
    );
    assert_eq!(fs.readlink(hello).unwrap(), Path::new("/scripted"));
    assert_eq!(fs.open_dir(Path::new("/")).unwrap(), canned_listing());
}

#[test]
fn opendir_error_replacement() {
    let fake = fixtures::small_fake();
    let (hook, fs) = hooked(&fake);
    hook.script_post(Operation::OpenDir, PostScript::Fail(Errno::PermissionDenied));

    assert_eq!(fs.open_dir(Path::new("/docs")), Err(Errno::PermissionDenied));
    assert_eq!(fake.calls("opendir"), 1);
}

#[test]
fn getlk_replacement() {
    let fake = fixtures::small_fake();
    let (hook, fs) = hooked(&fake);
    hook.script_post(Operation::GetLk, PostScript::Replace);

    let file = fs.open(Path::new("/hello.txt"), O_RDWR).unwrap();
    let lock = FileLock::whole_file(LockType::Read);
    assert_eq!(file.get_lk(3, &lock, 0).unwrap(), canned_lock());
    file.release();
}

#[test]
fn open_error_replacement_releases_delegate_handle() {
    let fake = fixtures::small_fake();
    let (hook, fs) = hooked(&fake);
    hook.script_post(Operation::Open, PostScript::Fail(Errno::PermissionDenied));

    let result = fs.open(Path::new("/hello.txt"), O_RDWR);
    assert_eq!(result.err(), Some(Errno::PermissionDenied));
    assert_eq!(fake.calls("open"), 1);
    assert_eq!(fake.releases(), 1);
    assert_eq!(fake.open_handles(), 0);
    // The release is internal; the hook never sees it.
    assert_eq!(hook.pre_calls(Operation::Release), 0);
}

#[test]
fn create_error_replacement_releases_delegate_handle() {
    let fake = fixtures::small_fake();
    let (hook, fs) = hooked(&fake);
    hook.script_post(Operation::Create, PostScript::Fail(Errno::NoSpace));

    let result = fs.create(Path::new("/new.txt"), O_CREAT | O_RDWR, 0o644);
    assert_eq!(result.err(), Some(Errno::NoSpace));
    assert_eq!(fake.open_handles(), 0);
    // The delegate already created the file.
    assert!(fake.exists("/new.txt"));
}

#[test]
fn open_replacement_error_over_failure() {
    let fake = fixtures::small_fake();
    let (hook, fs) = hooked(&fake);
    hook.script_post(Operation::Open, PostScript::Fail(Errno::Busy));

    let result = fs.open(Path::new("/missing"), O_RDWR);
    assert_eq!(result.err(), Some(Errno::Busy));
    assert_eq!(hook.last_post_status(Operation::Open), Some(Err(Errno::NotFound)));
}

#[test]
fn open_replacement_success_over_success_keeps_handle() {
    let fake = fixtures::small_fake();
    let (hook, fs) = hooked(&fake);
    hook.script_post(Operation::Open, PostScript::Replace);

    let file = fs.open(Path::new("/hello.txt"), O_RDWR).unwrap();
    assert_eq!(file.read(5, 0).unwrap(), b"hello");
    file.release();
    assert_eq!(fake.releases(), 1);
}

#[test]
fn statfs_replacement() {
    let fake = fixtures::small_fake();
    let (hook, fs) = hooked(&fake);

    hook.script_post(Operation::StatFs, PostScript::Replace);
    assert_eq!(fs.statfs(Path::new("/")), fake.statfs(Path::new("/")));

    hook.script_post(Operation::StatFs, PostScript::Fail(Errno::Io));
    assert!(fs.statfs(Path::new("/")).is_none());
}

#[test]
fn release_replacement_is_observed_only() {
    let fake = fixtures::small_fake();
    let (hook, fs) = hooked(&fake);
    hook.script_post(Operation::Release, PostScript::Fail(Errno::Io));

    let file = fs.open(Path::new("/hello.txt"), O_RDWR).unwrap();
    file.release();
    assert_eq!(fake.releases(), 1);
}
