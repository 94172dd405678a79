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

mod index_options;

pub use self::index_options::*;

use crate::error::ErrorKind::IllegalArgument;
use crate::error::Result;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Per-field metadata the term dictionary needs: the field's identity and
/// what its postings record.
#[derive(Clone, Debug, Serialize)]
pub struct FieldInfo {
    pub name: String,
    pub number: u32,
    pub index_options: IndexOptions,
    pub has_store_payloads: bool,
    pub attributes: HashMap<String, String>,
}

impl FieldInfo {
    pub fn new(
        name: String,
        number: u32,
        index_options: IndexOptions,
        store_payloads: bool,
    ) -> Result<FieldInfo> {
        let info = FieldInfo {
            name,
            number,
            index_options,
            has_store_payloads: store_payloads,
            attributes: HashMap::new(),
        };
        info.check_consistency()?;
        Ok(info)
    }

    pub fn check_consistency(&self) -> Result<()> {
        if self.index_options == IndexOptions::Null && self.has_store_payloads {
            bail!(IllegalArgument(format!(
                "non-indexed field '{}' cannot have payloads",
                &self.name
            )));
        }
        if self.has_store_payloads && !self.index_options.has_positions() {
            bail!(IllegalArgument(format!(
                "field '{}' stores payloads without positions",
                &self.name
            )));
        }
        Ok(())
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn put_attribute(&mut self, key: String, value: String) -> Option<String> {
        self.attributes.insert(key, value)
    }
}

impl fmt::Display for FieldInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "FieldInfo(name={}, number={}, index_options={})",
            self.name,
            self.number,
            self.index_options.as_str()
        )
    }
}

/// Collection of `FieldInfo`s, addressable by number or by name.
#[derive(Debug, Serialize)]
pub struct FieldInfos {
    pub has_freq: bool,
    pub has_prox: bool,
    pub has_payloads: bool,
    pub has_offsets: bool,

    pub by_number: BTreeMap<u32, Arc<FieldInfo>>,
    pub by_name: HashMap<String, Arc<FieldInfo>>,
}

impl FieldInfos {
    pub fn new(infos: Vec<FieldInfo>) -> Result<FieldInfos> {
        let mut has_freq = false;
        let mut has_prox = false;
        let mut has_payloads = false;
        let mut has_offsets = false;

        let mut by_number = BTreeMap::new();
        let mut by_name = HashMap::new();

        for info in infos {
            let info = Arc::new(info);
            if let Some(previous) = by_number.insert(info.number, Arc::clone(&info)) {
                bail!(IllegalArgument(format!(
                    "duplicate field numbers: {} and {} have: {}",
                    previous.name, info.name, info.number
                )));
            }
            if by_name.insert(info.name.clone(), Arc::clone(&info)).is_some() {
                bail!(IllegalArgument(format!("duplicate field name: {}", info.name)));
            }

            has_freq |= info.index_options.has_freqs();
            has_prox |= info.index_options.has_positions();
            has_offsets |= info.index_options.has_offsets();
            has_payloads |= info.has_store_payloads;
        }

        Ok(FieldInfos {
            has_freq,
            has_prox,
            has_payloads,
            has_offsets,
            by_number,
            by_name,
        })
    }

    pub fn field_info_by_number(&self, field_number: u32) -> Option<&FieldInfo> {
        self.by_number.get(&field_number).map(|info| info.as_ref())
    }

    pub fn field_info_by_name(&self, field_name: &str) -> Option<&FieldInfo> {
        self.by_name.get(field_name).map(|info| info.as_ref())
    }

    pub fn len(&self) -> usize {
        self.by_number.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_number.is_empty()
    }

    /// Field infos in ascending field number order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<FieldInfo>> {
        self.by_number.values()
    }
}

impl fmt::Display for FieldInfos {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(|info| info.name.as_str()).collect();
        write!(f, "FieldInfos({})", names.join(", "))
    }
}
