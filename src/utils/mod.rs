// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod runtime;
pub mod sync;

pub use runtime::current_runtime;
pub use sync::lock;
