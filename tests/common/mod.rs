//! Shared fixture: in-memory bucket and ledger host plus a scratch directory

#![allow(dead_code)]

use ingest_lane::mock::{build_tarball, metadata_record, MockGitHost, MockObjectStore};
use ingest_lane::{enumerate, locations, Artifact, Lane, LaneConfig, Ledger, ProcessOutcome, RunSummary, Stage};
use tempfile::TempDir;

pub const BUCKET: &str = "software-staging";
pub const SUFFIX: &str = ".meta.txt";

pub struct Fixture {
    pub scratch: TempDir,
    pub store: MockObjectStore,
    pub host: MockGitHost,
    pub config: LaneConfig,
}

impl Fixture {
    /// Empty bucket; the ingestion command is `sh -c <script> ingest <tarball>`
    pub fn new(script: &str) -> Self {
        let scratch = TempDir::new().unwrap();
        let config = LaneConfig::from_toml_str(&format!(
            r#"
            bucket = "{bucket}"
            scratch_dir = "{scratch}"

            [github]
            repository = "owner/ledger"
            main_branch = "main"

            [ingest]
            command = ["sh", "-c", '{script}', "ingest"]
            timeout_seconds = 30
            "#,
            bucket = BUCKET,
            scratch = scratch.path().display(),
            script = script,
        ))
        .unwrap();

        Self {
            scratch,
            store: MockObjectStore::new(),
            host: MockGitHost::new("main"),
            config,
        }
    }

    /// Upload a tarball and its record to the bucket
    pub fn upload(&self, key: &str) -> Artifact {
        let filename = key.rsplit('/').next().unwrap();
        let tarball = build_tarball(
            &["pkg/", "pkg/bin/", "pkg/lib/"],
            &[("pkg/bin/tool", b"#!/bin/sh\necho tool\n"), ("pkg/lib/libtool.so", b"\x7fELF")],
        );
        self.store.put(
            BUCKET,
            &format!("{}{}", key, SUFFIX),
            metadata_record(filename, &tarball).into_bytes(),
        );
        self.store.put(BUCKET, key, tarball);
        Artifact::new(key, SUFFIX)
    }

    pub fn lane(&self) -> Lane<'_> {
        Lane::new(&self.config, &self.store, &self.host)
    }

    /// One full invocation over everything in the bucket
    pub fn run(&self) -> RunSummary {
        let artifacts = enumerate(&self.store, BUCKET, SUFFIX).unwrap();
        self.lane().run_all(&artifacts)
    }

    /// Outcome of the only artifact in a run
    pub fn run_one(&self) -> ProcessOutcome {
        let summary = self.run();
        assert_eq!(summary.artifacts.len(), 1, "{:?}", summary.artifacts);
        let report = &summary.artifacts[0];
        match &report.outcome {
            Some(outcome) => outcome.clone(),
            None => panic!("{} failed: {:?}", report.key, report.error),
        }
    }

    pub fn locations(&self, artifact: &Artifact) -> Vec<Stage> {
        let ledger = Ledger::new(&self.host, "main");
        locations(&ledger, artifact).unwrap()
    }

    /// Number of the only pull request opened so far
    pub fn only_pr(&self) -> u64 {
        let pulls = self.host.pull_requests();
        assert_eq!(pulls.len(), 1, "{:?}", pulls);
        pulls[0].number
    }
}
