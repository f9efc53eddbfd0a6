#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::{TempDir, tempdir};

pub const PEOPLE_CSV: &str = "\
id,name,age,vip,joined,team_id
1,Ada,36,true,2021-03-04,10
2,Bob,17,false,2022-11-30,20
3,\"Cy, Jr.\",41,true,2020-01-15,10
4,Dee,,false,2023-07-01,30
";

pub const TEAMS_CSV: &str = "\
tid,team
10,red
20,blue
";

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        self.write_bytes(name, contents.as_bytes())
    }

    pub fn write_bytes(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.file(name);
        fs::write(&path, contents).expect("write temp file contents");
        path
    }
}

pub fn rows(text: &str) -> Vec<Vec<String>> {
    tabular_query::csv_parser::parse(text)
}
