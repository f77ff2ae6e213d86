//! # Native Call Boundary
//!
//! Builds and performs a call to an arbitrary address, driven entirely by a
//! parsed [`SignatureDescriptor`]. This module is the single place where an
//! integer is turned into a function pointer; everything above it works with
//! validated descriptors and typed [`Value`](crate::types::Value)s.
//!
//! ## Dispatch strategy
//!
//! Arguments arrive already marshalled into machine words ([`NativeArg`]).
//! How they are handed to the callee depends on the target:
//!
//! - **x86_64 (System V) and aarch64**: integer-class and float-class
//!   arguments travel in two independent register files. The call is made
//!   through one fixed function type taking eight words and eight doubles, in
//!   declaration order within each class. Registers the callee does not
//!   declare are simply ignored, and the caller cleans up, so one function type
//!   serves every signature within the limits. Single precision values ride in
//!   the low half of a double register, which is where the callee reads them.
//!   Calling conventions have no meaning on these targets.
//! - **32-bit x86**: every argument is pushed as 32-bit stack words, and the
//!   call goes through a function type with exactly that many words so that
//!   `stdcall` callees pop what was pushed. `fastcall` takes its first two
//!   words in `ecx`/`edx`, which only matches the callee when every parameter is
//!   integer-class.
//! - **everything else**: no dispatcher; calls fail with `UnsupportedSignature`.
//!
//! ## Safety
//!
//! Nothing here can verify that the address really is a function with the
//! declared signature. A wrong address or signature corrupts or crashes the
//! process; that risk is accepted by whoever registered the function.

use std::io;
use std::mem::transmute;
use std::sync::mpsc::{self, Receiver};
use std::thread;

use tracing::trace;

use crate::error::{CallgateError, CallgateResult};
use crate::signature::SignatureDescriptor;
use crate::types::{Address, TypeToken};

/// One marshalled argument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NativeArg
{
    /// Integer-class value (integers, pointers, buffer addresses), zero- or
    /// sign-extended to 64 bits
    Word(u64),
    /// Single precision float
    Single(f32),
    /// Double precision float
    Double(f64),
}

/// Raw result of a native call, classified by the declared return type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NativeReturn
{
    /// The function returns nothing
    Void,
    /// Integer-class return register contents
    Word(u64),
    /// Single precision float return
    Single(f32),
    /// Double precision float return
    Double(f64),
}

/// Call the function at `address` with `args`, as described by `descriptor`.
///
/// `args` must already match `descriptor.params()` one to one; the invocation
/// engine guarantees that before getting here.
///
/// ## Errors
///
/// - `UnsupportedSignature`: the arguments do not fit this target's dispatcher
///
/// ## Safety
///
/// `address` must be the entry point of a function whose real signature and
/// calling convention match `descriptor`, and any pointer arguments must be
/// valid for whatever the callee does with them.
pub unsafe fn invoke(address: Address, descriptor: &SignatureDescriptor, args: &[NativeArg]) -> CallgateResult<NativeReturn>
{
    trace!(%address, signature = %descriptor, ?args, "Dispatching native call");
    unsafe { dispatch::call(address.value(), descriptor, args) }
}

/// Entry point shape of a context-switched call: one pointer-sized parameter,
/// pointer-sized exit code.
type ThreadRoutine = unsafe extern "system" fn(usize) -> usize;

/// Start a new thread whose entry point is the function at `address`.
///
/// The thread runs `address(parameter)` and sends the routine's exit code on
/// the returned channel when it returns. If the thread ends any other way the
/// channel disconnects without a value. The thread is detached: nothing can
/// stop it once started.
///
/// ## Errors
///
/// Returns the OS error when the thread cannot be created.
///
/// ## Safety
///
/// `address` must be a function taking one pointer-sized argument using the
/// platform's system calling convention, and it must be safe to run on a
/// fresh thread with `parameter`.
pub unsafe fn spawn_routine(address: Address, parameter: usize, thread_name: String) -> io::Result<Receiver<usize>>
{
    let (sender, receiver) = mpsc::channel();
    let entry_point = address.value();
    thread::Builder::new().name(thread_name).spawn(move || {
        // SAFETY: upheld by the caller of `spawn_routine`.
        let routine = unsafe { transmute::<usize, ThreadRoutine>(entry_point) };
        let exit_code = unsafe { routine(parameter) };
        let _ = sender.send(exit_code);
    })?;
    trace!(%address, parameter, "Spawned context-switched thread");
    Ok(receiver)
}

#[cfg(any(all(target_arch = "x86_64", not(windows)), target_arch = "aarch64"))]
mod dispatch
{
    use super::{transmute, trace, CallgateError, CallgateResult, NativeArg, NativeReturn, SignatureDescriptor, TypeToken};
    use crate::signature::CallingConvention;

    /// Integer-class arguments the dispatcher can pass
    pub const MAX_WORD_ARGS: usize = 8;
    /// Float-class arguments the dispatcher can pass
    pub const MAX_FLOAT_ARGS: usize = 8;

    type WordFn = unsafe extern "C" fn(u64, u64, u64, u64, u64, u64, u64, u64, f64, f64, f64, f64, f64, f64, f64, f64) -> u64;
    type SingleFn = unsafe extern "C" fn(u64, u64, u64, u64, u64, u64, u64, u64, f64, f64, f64, f64, f64, f64, f64, f64) -> f32;
    type DoubleFn = unsafe extern "C" fn(u64, u64, u64, u64, u64, u64, u64, u64, f64, f64, f64, f64, f64, f64, f64, f64) -> f64;

    pub unsafe fn call(address: usize, descriptor: &SignatureDescriptor, args: &[NativeArg]) -> CallgateResult<NativeReturn>
    {
        if descriptor.convention() != CallingConvention::Default {
            trace!(convention = ?descriptor.convention(), "Calling convention has no effect on this target");
        }

        let mut words = [0u64; MAX_WORD_ARGS];
        let mut floats = [0f64; MAX_FLOAT_ARGS];
        let (mut word_count, mut float_count) = (0usize, 0usize);

        for arg in args {
            match *arg {
                NativeArg::Word(value) => {
                    let slot = words.get_mut(word_count).ok_or_else(|| too_many("integer", MAX_WORD_ARGS))?;
                    *slot = value;
                    word_count += 1;
                }
                NativeArg::Single(value) => {
                    let slot = floats.get_mut(float_count).ok_or_else(|| too_many("float", MAX_FLOAT_ARGS))?;
                    *slot = f64::from_bits(u64::from(value.to_bits()));
                    float_count += 1;
                }
                NativeArg::Double(value) => {
                    let slot = floats.get_mut(float_count).ok_or_else(|| too_many("float", MAX_FLOAT_ARGS))?;
                    *slot = value;
                    float_count += 1;
                }
            }
        }

        let [w0, w1, w2, w3, w4, w5, w6, w7] = words;
        let [f0, f1, f2, f3, f4, f5, f6, f7] = floats;

        let result = unsafe {
            match descriptor.return_type() {
                TypeToken::Float32 => {
                    let function: SingleFn = transmute::<usize, SingleFn>(address);
                    NativeReturn::Single(function(w0, w1, w2, w3, w4, w5, w6, w7, f0, f1, f2, f3, f4, f5, f6, f7))
                }
                TypeToken::Float64 => {
                    let function: DoubleFn = transmute::<usize, DoubleFn>(address);
                    NativeReturn::Double(function(w0, w1, w2, w3, w4, w5, w6, w7, f0, f1, f2, f3, f4, f5, f6, f7))
                }
                TypeToken::Void => {
                    let function: WordFn = transmute::<usize, WordFn>(address);
                    function(w0, w1, w2, w3, w4, w5, w6, w7, f0, f1, f2, f3, f4, f5, f6, f7);
                    NativeReturn::Void
                }
                TypeToken::Int32 | TypeToken::UInt32 | TypeToken::Pointer | TypeToken::FixedBuffer(_) => {
                    let function: WordFn = transmute::<usize, WordFn>(address);
                    NativeReturn::Word(function(w0, w1, w2, w3, w4, w5, w6, w7, f0, f1, f2, f3, f4, f5, f6, f7))
                }
            }
        };
        Ok(result)
    }

    fn too_many(class: &str, limit: usize) -> CallgateError
    {
        CallgateError::UnsupportedSignature(format!(
            "at most {limit} {class} arguments can be passed on this target"
        ))
    }
}

#[cfg(target_arch = "x86")]
mod dispatch
{
    use super::{transmute, CallgateError, CallgateResult, NativeArg, NativeReturn, SignatureDescriptor, TypeToken};
    use crate::signature::CallingConvention;

    /// Stack words the dispatcher can push
    pub const MAX_STACK_WORDS: usize = 8;

    macro_rules! call_with_words {
        ($abi:literal, $address:expr, $words:expr, $ret:ty) => {{
            let w = $words;
            match w.len() {
                0 => transmute::<usize, unsafe extern $abi fn() -> $ret>($address)(),
                1 => transmute::<usize, unsafe extern $abi fn(u32) -> $ret>($address)(w[0]),
                2 => transmute::<usize, unsafe extern $abi fn(u32, u32) -> $ret>($address)(w[0], w[1]),
                3 => transmute::<usize, unsafe extern $abi fn(u32, u32, u32) -> $ret>($address)(w[0], w[1], w[2]),
                4 => transmute::<usize, unsafe extern $abi fn(u32, u32, u32, u32) -> $ret>($address)(
                    w[0], w[1], w[2], w[3],
                ),
                5 => transmute::<usize, unsafe extern $abi fn(u32, u32, u32, u32, u32) -> $ret>($address)(
                    w[0], w[1], w[2], w[3], w[4],
                ),
                6 => transmute::<usize, unsafe extern $abi fn(u32, u32, u32, u32, u32, u32) -> $ret>($address)(
                    w[0], w[1], w[2], w[3], w[4], w[5],
                ),
                7 => transmute::<usize, unsafe extern $abi fn(u32, u32, u32, u32, u32, u32, u32) -> $ret>($address)(
                    w[0], w[1], w[2], w[3], w[4], w[5], w[6],
                ),
                _ => transmute::<usize, unsafe extern $abi fn(u32, u32, u32, u32, u32, u32, u32, u32) -> $ret>(
                    $address,
                )(w[0], w[1], w[2], w[3], w[4], w[5], w[6], w[7]),
            }
        }};
    }

    macro_rules! call_by_return {
        ($abi:literal, $address:expr, $words:expr, $descriptor:expr) => {
            match $descriptor.return_type() {
                TypeToken::Float32 => NativeReturn::Single(call_with_words!($abi, $address, $words, f32)),
                TypeToken::Float64 => NativeReturn::Double(call_with_words!($abi, $address, $words, f64)),
                TypeToken::Void => {
                    call_with_words!($abi, $address, $words, ());
                    NativeReturn::Void
                }
                _ => NativeReturn::Word(u64::from(call_with_words!($abi, $address, $words, u32))),
            }
        };
    }

    pub unsafe fn call(address: usize, descriptor: &SignatureDescriptor, args: &[NativeArg]) -> CallgateResult<NativeReturn>
    {
        let mut words: Vec<u32> = Vec::with_capacity(args.len() * 2);
        for arg in args {
            match *arg {
                NativeArg::Word(value) => words.push(value as u32),
                NativeArg::Single(value) => words.push(value.to_bits()),
                NativeArg::Double(value) => {
                    let bits = value.to_bits();
                    words.push(bits as u32);
                    words.push((bits >> 32) as u32);
                }
            }
        }
        if words.len() > MAX_STACK_WORDS {
            return Err(CallgateError::UnsupportedSignature(format!(
                "at most {MAX_STACK_WORDS} stack words can be passed on this target, got {}",
                words.len()
            )));
        }

        let result = unsafe {
            match descriptor.convention() {
                CallingConvention::Default => call_by_return!("C", address, &words, descriptor),
                CallingConvention::Stdcall => call_by_return!("stdcall", address, &words, descriptor),
                CallingConvention::Fastcall => {
                    if descriptor.params().iter().any(|param| param.is_float()) {
                        return Err(CallgateError::UnsupportedSignature(
                            "fastcall with floating point parameters is not supported".to_string(),
                        ));
                    }
                    call_by_return!("fastcall", address, &words, descriptor)
                }
            }
        };
        Ok(result)
    }
}

#[cfg(not(any(
    all(target_arch = "x86_64", not(windows)),
    target_arch = "aarch64",
    target_arch = "x86"
)))]
mod dispatch
{
    use super::{CallgateError, CallgateResult, NativeArg, NativeReturn, SignatureDescriptor};

    pub unsafe fn call(_address: usize, _descriptor: &SignatureDescriptor, _args: &[NativeArg]) -> CallgateResult<NativeReturn>
    {
        Err(CallgateError::UnsupportedSignature(
            "native calls are not supported on this target".to_string(),
        ))
    }
}

#[cfg(all(test, any(all(target_arch = "x86_64", not(windows)), target_arch = "aarch64")))]
mod tests
{
    use super::*;
    use crate::signature::SignatureDescriptor;

    extern "C" fn sum_words(a: i32, b: u32, c: i32) -> i32
    {
        a + b as i32 + c
    }

    extern "C" fn interleaved(a: i32, x: f32, b: i32, y: f64) -> f64
    {
        f64::from(a) + f64::from(x) + f64::from(b) + y
    }

    #[test]
    fn test_words_are_passed_in_order()
    {
        let sig = SignatureDescriptor::parse("int(int, unsigned int, int)").unwrap();
        let args = [NativeArg::Word(10), NativeArg::Word(20), NativeArg::Word((-5i32) as u32 as u64)];
        let result = unsafe { invoke(Address::new(sum_words as usize), &sig, &args) }.unwrap();
        assert!(matches!(result, NativeReturn::Word(raw) if raw as u32 as i32 == 25));
    }

    #[test]
    fn test_float_and_word_classes_are_independent()
    {
        let sig = SignatureDescriptor::parse("double(int, float, int, double)").unwrap();
        let args = [
            NativeArg::Word(1),
            NativeArg::Single(0.5),
            NativeArg::Word(2),
            NativeArg::Double(0.25),
        ];
        let result = unsafe { invoke(Address::new(interleaved as usize), &sig, &args) }.unwrap();
        assert_eq!(result, NativeReturn::Double(3.75));
    }

    #[test]
    fn test_too_many_word_arguments()
    {
        let params = [TypeToken::Int32; 9];
        let sig = SignatureDescriptor::new(TypeToken::Void, Default::default(), &params).unwrap();
        let args = [NativeArg::Word(0); 9];
        let err = unsafe { invoke(Address::new(sum_words as usize), &sig, &args) }.unwrap_err();
        assert!(matches!(err, CallgateError::UnsupportedSignature(_)));
    }
}
