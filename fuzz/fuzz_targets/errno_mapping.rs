#![no_main]

use libfuzzer_sys::fuzz_target;

use hookfs_common::{Errno, HookError};
use hookfs_interceptor::Operation;

fuzz_target!(|input: (i32, u8, String)| {
    let (code, op, message) = input;

    let errno = Errno::from_raw(code);
    assert_eq!(errno.raw(), code);

    let io: std::io::Error = errno.into();
    assert_eq!(Errno::from(io), errno);

    assert_eq!(HookError::from(errno).errno(), errno);
    assert_eq!(HookError::message(message.as_str()).errno(), Errno::NotImplemented);

    let op = Operation::ALL[usize::from(op) % Operation::ALL.len()];
    assert!(!op.name().is_empty());
});
