//! In-memory remotes for tests
//!
//! - `MockObjectStore`: buckets as maps, with per-key failure injection
//! - `MockGitHost`: branches as full file trees, pull requests with
//!   review helpers (`merge_pull_request`, `close_pull_request`), issues,
//!   a mutation counter, and per-operation failure injection
//!
//! Both are `Send + Sync` and can be shared by reference across a run.

mod failure;
mod host;
mod store;

pub use failure::{FailureInjector, HostOp};
pub use host::MockGitHost;
pub use store::MockObjectStore;

use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};

/// Build a gzip-compressed tarball with the given directories and files
pub fn build_tarball(dirs: &[&str], files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));

    for dir in dirs {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Directory);
        header.set_size(0);
        header.set_mode(0o755);
        header.set_mtime(0);
        header.set_cksum();
        builder
            .append_data(&mut header, dir, std::io::empty())
            .expect("append directory to in-memory tarball");
    }

    for (path, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(0);
        header.set_cksum();
        builder
            .append_data(&mut header, path, *content)
            .expect("append file to in-memory tarball");
    }

    let encoder = builder.into_inner().expect("finish in-memory tarball");
    encoder.finish().expect("finish gzip stream")
}

/// Metadata record carrying the checksum of `tarball`
pub fn metadata_record(filename: &str, tarball: &[u8]) -> String {
    format!(
        "{{\"uploader\": {{\"username\": \"bot\"}}, \"payload\": {{\"filename\": \"{}\", \"size\": {}, \"sha256sum\": \"{}\"}}}}\n",
        filename,
        tarball.len(),
        hex::encode(Sha256::digest(tarball))
    )
}
