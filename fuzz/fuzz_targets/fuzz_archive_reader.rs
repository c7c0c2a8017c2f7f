//! Fuzz target for zip archive reading.
//!
//! Archives come from untrusted bug reports. Opening, indexing and reading
//! members under the default security limits should never panic, only
//! return an error or a rejection.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sift_vfs::archive::ArchiveReader;
use sift_vfs::{ArchiveSecurityLimits, VirtualPath};

fuzz_target!(|data: &[u8]| {
    let Ok(mut reader) = ArchiveReader::from_bytes(VirtualPath::parse("fuzz.zip"), data.to_vec())
    else {
        return;
    };
    let limits = ArchiveSecurityLimits::default();
    let mut budget = limits.budget();
    let members = reader.members().to_vec();
    for member in members.iter().filter(|m| m.is_listable()) {
        if budget.admit(member, 1).is_err() {
            continue;
        }
        let _ = reader.read_member(member.index, limits.max_file_size);
    }
});
