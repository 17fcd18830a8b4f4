// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod credential;
pub mod sample;

pub use credential::{Credential, CredentialUpdate, StoredCredential};
pub use sample::Sample;
