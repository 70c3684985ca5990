// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod edits;
pub mod ids;
pub mod model;

pub use edits::*;
pub use ids::*;
pub use model::*;
