// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

pub mod channels;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod identity;
pub mod notify;
pub mod registry;
pub mod relay;
pub mod run;
pub mod session;
pub mod state;
pub mod test_support;
pub mod transport;
