// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Lexically scoped execution modes.
//!
//! Model libraries consult these flags while they run:
//!
//! * [`random_init_active`]: weights should be freshly initialized rather
//!   than read from disk. Set while a no-weights model is loaded.
//! * [`inference_mode_active`]: no gradient bookkeeping is needed. Set for
//!   the duration of every inference call.
//!
//! The flags are per-thread and nest; each guard restores the previous
//! depth when dropped, including on early return.

use std::cell::Cell;
use std::marker::PhantomData;

thread_local! {
    static RANDOM_INIT: Cell<usize> = const { Cell::new(0) };
    static INFERENCE_MODE: Cell<usize> = const { Cell::new(0) };
}

fn enter(flag: &'static std::thread::LocalKey<Cell<usize>>) {
    flag.with(|depth| depth.set(depth.get() + 1));
}

fn leave(flag: &'static std::thread::LocalKey<Cell<usize>>) {
    flag.with(|depth| depth.set(depth.get().saturating_sub(1)));
}

fn active(flag: &'static std::thread::LocalKey<Cell<usize>>) -> bool {
    flag.with(|depth| depth.get() > 0)
}

/// Keeps random weight initialization enabled while alive.
#[must_use = "random initialization ends when the guard is dropped"]
#[derive(Debug)]
pub struct RandomInitGuard {
    _not_send: PhantomData<*const ()>,
}

impl Drop for RandomInitGuard {
    fn drop(&mut self) {
        leave(&RANDOM_INIT);
    }
}

pub fn random_init() -> RandomInitGuard {
    enter(&RANDOM_INIT);
    RandomInitGuard {
        _not_send: PhantomData,
    }
}

pub fn random_init_active() -> bool {
    active(&RANDOM_INIT)
}

/// Keeps inference mode enabled while alive.
#[must_use = "inference mode ends when the guard is dropped"]
#[derive(Debug)]
pub struct InferenceModeGuard {
    _not_send: PhantomData<*const ()>,
}

impl Drop for InferenceModeGuard {
    fn drop(&mut self) {
        leave(&INFERENCE_MODE);
    }
}

pub fn inference_mode() -> InferenceModeGuard {
    enter(&INFERENCE_MODE);
    InferenceModeGuard {
        _not_send: PhantomData,
    }
}

pub fn inference_mode_active() -> bool {
    active(&INFERENCE_MODE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guards_nest() {
        assert!(!random_init_active());
        {
            let _outer = random_init();
            {
                let _inner = random_init();
                assert!(random_init_active());
            }
            assert!(random_init_active());
        }
        assert!(!random_init_active());
    }

    #[test]
    fn test_guard_released_on_error_path() {
        fn failing() -> Result<(), String> {
            let _mode = inference_mode();
            assert!(inference_mode_active());
            Err("boom".into())
        }
        assert!(failing().is_err());
        assert!(!inference_mode_active());
    }

    #[test]
    fn test_flags_are_independent() {
        let _mode = inference_mode();
        assert!(inference_mode_active());
        assert!(!random_init_active());
    }
}
