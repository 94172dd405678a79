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

//! Utility functions for reading and writing versioned headers.
//!
//! Writing codec headers is useful to ensure that a file is in
//! the format you think it is.

use crate::core::store::io::{DataOutput, IndexInput};

use crate::error::ErrorKind::{CorruptIndex, IllegalArgument};
use crate::error::Result;

/// Constant to identify the start of a codec header.
pub const CODEC_MAGIC: i32 = 0x3FD7_6C17;

/// Writes a codec header, which records both a string to identify the file and a version number.
///
/// CodecHeader --> Magic,CodecName,Version
/// * Magic --> `DataOutput::write_int`. This identifies the start of the header. It is always
///   `CODEC_MAGIC`.
/// * CodecName --> `DataOutput::write_string`. This is a string to identify this file.
/// * Version --> `DataOutput::write_int`. Records the version of the file.
///
/// Note that the length of a codec header depends only upon the name of the codec,
/// see `header_length`.
pub fn write_header<T: DataOutput + ?Sized>(out: &mut T, codec: &str, version: i32) -> Result<()> {
    let clen = codec.len();
    if clen >= 128 {
        bail!(IllegalArgument(format!(
            "codec must be simple ASCII less than 128 characters, got {}[length={}]",
            codec, clen,
        )));
    }
    out.write_int(CODEC_MAGIC)?;
    out.write_string(codec)?;
    out.write_int(version)
}

/// Computes the length of a codec header.
pub fn header_length(codec: &str) -> usize {
    9 + codec.len()
}

/// Reads and validates a header previously written with `write_header`.
///
/// When reading a file, supply the expected codec name and the supported
/// version range `[min_ver, max_ver]`. Returns the actual version.
pub fn check_header<T: IndexInput + ?Sized>(
    input: &mut T,
    codec: &str,
    min_ver: i32,
    max_ver: i32,
) -> Result<i32> {
    let actual_header = input.read_int()?;
    if actual_header != CODEC_MAGIC {
        bail!(CorruptIndex(format!(
            "codec header mismatch: actual=0x{:X}, expected=0x{:X} (resource={})",
            actual_header,
            CODEC_MAGIC,
            input.name()
        )));
    }
    check_header_no_magic(input, codec, min_ver, max_ver)
}

/// Like `check_header` except this version assumes the first i32 has already
/// been read and validated from the input.
pub fn check_header_no_magic<T: IndexInput + ?Sized>(
    input: &mut T,
    codec: &str,
    min_ver: i32,
    max_ver: i32,
) -> Result<i32> {
    let actual_codec = input.read_string()?;
    if actual_codec != codec {
        bail!(CorruptIndex(format!(
            "codec mismatch: actual={}, expected={} (resource={})",
            actual_codec,
            codec,
            input.name()
        )));
    }
    let actual_ver = input.read_int()?;
    if actual_ver < min_ver || actual_ver > max_ver {
        bail!(CorruptIndex(format!(
            "index format either too new or too old: {} <= {} <= {} doesn't hold (resource={})",
            min_ver,
            actual_ver,
            max_ver,
            input.name()
        )));
    }
    Ok(actual_ver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::directory::{Directory, RAMDirectory};
    use crate::core::store::{IOContext, IO_CONTEXT_READ};
    use crate::error::ErrorKind;

    fn header_file(dir: &RAMDirectory, name: &str, codec: &str, version: i32) {
        let mut out = dir.create_output(name, &IOContext::Flush).unwrap();
        write_header(&mut out, codec, version).unwrap();
    }

    #[test]
    fn test_check_header() {
        let dir = RAMDirectory::new();
        header_file(&dir, "ok", "FOO", 1);
        assert_eq!(dir.file_length("ok").unwrap() as usize, header_length("FOO"));

        let mut input = dir.open_input("ok", &IO_CONTEXT_READ).unwrap();
        assert_eq!(check_header(input.as_mut(), "FOO", 0, 1).unwrap(), 1);
    }

    #[test]
    fn test_check_header_rejects_mismatch() {
        let dir = RAMDirectory::new();
        header_file(&dir, "codec", "BAR", 1);
        header_file(&dir, "version", "FOO", 7);

        let mut input = dir.open_input("codec", &IO_CONTEXT_READ).unwrap();
        match check_header(input.as_mut(), "FOO", 0, 1) {
            Err(e) => match e.kind() {
                ErrorKind::CorruptIndex(msg) => assert!(msg.contains("codec mismatch")),
                k => panic!("unexpected error {:?}", k),
            },
            Ok(_) => panic!("codec mismatch accepted"),
        }

        let mut input = dir.open_input("version", &IO_CONTEXT_READ).unwrap();
        assert!(check_header(input.as_mut(), "FOO", 0, 1).is_err());

        let mut out: Vec<u8> = Vec::new();
        let long_name: String = ::std::iter::repeat('x').take(128).collect();
        assert!(write_header(&mut out, &long_name, 0).is_err());
    }
}
