// Copyright 2019 Zhizhesihai (Beijing) Technology Limited.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::core::codec::Terms;
use crate::error::Result;

/// Provides a `Terms` index for fields that have it, and lists which fields do.
pub trait Fields {
    type Terms: Terms;

    /// Names of the fields with terms, in sorted order.
    fn fields(&self) -> Vec<String>;

    /// Returns the terms of the field, or `None` if the field has no terms.
    fn terms(&self, field: &str) -> Result<Option<Self::Terms>>;

    /// Number of fields with terms.
    fn size(&self) -> usize;
}
