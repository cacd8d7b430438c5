//! Verification helpers for driver tests
//!
//! Provides assertion helpers to verify what a driver or daemon wrote into
//! the fake tree.

use std::path::Path;

use thiserror::Error;

use crate::FakeSysfs;

/// Verification error types
#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("Expected file '{path}' not found")]
    FileNotFound { path: String },

    #[error("File '{path}' should not exist")]
    UnexpectedFile { path: String },

    #[error("Content mismatch for '{path}': expected '{expected}', got '{actual}'")]
    ContentMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("Expected {expected} lines in '{path}', found {actual}")]
    LineCountMismatch {
        path: String,
        expected: usize,
        actual: usize,
    },
}

/// Result type for verification operations
pub type VerifyResult<T> = Result<T, VerificationError>;

/// Fake tree verification helper
pub struct SysfsVerifier<'a> {
    fake: &'a FakeSysfs,
}

impl<'a> SysfsVerifier<'a> {
    /// Create a new verifier over a fake tree
    pub fn new(fake: &'a FakeSysfs) -> Self {
        Self { fake }
    }

    /// Verify that a file exists
    pub fn assert_exists(&self, path: impl AsRef<Path>) -> VerifyResult<()> {
        let path = path.as_ref();
        if !self.fake.exists(path) {
            return Err(VerificationError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        Ok(())
    }

    /// Verify that a file does not exist
    pub fn assert_absent(&self, path: impl AsRef<Path>) -> VerifyResult<()> {
        let path = path.as_ref();
        if self.fake.exists(path) {
            return Err(VerificationError::UnexpectedFile {
                path: path.display().to_string(),
            });
        }
        Ok(())
    }

    /// Verify trimmed file content
    pub fn assert_content(&self, path: impl AsRef<Path>, expected: &str) -> VerifyResult<()> {
        let path = path.as_ref();
        self.assert_exists(path)?;
        let actual = self.fake.read(path);
        if actual.trim() != expected.trim() {
            return Err(VerificationError::ContentMismatch {
                path: path.display().to_string(),
                expected: expected.to_string(),
                actual,
            });
        }
        Ok(())
    }

    /// Verify that the file contains a substring
    pub fn assert_contains(&self, path: impl AsRef<Path>, needle: &str) -> VerifyResult<()> {
        let path = path.as_ref();
        self.assert_exists(path)?;
        let actual = self.fake.read(path);
        if !actual.contains(needle) {
            return Err(VerificationError::ContentMismatch {
                path: path.display().to_string(),
                expected: format!("...{}...", needle),
                actual,
            });
        }
        Ok(())
    }

    /// Verify the number of non-empty lines
    pub fn assert_line_count(&self, path: impl AsRef<Path>, expected: usize) -> VerifyResult<()> {
        let path = path.as_ref();
        self.assert_exists(path)?;
        let actual = self
            .fake
            .read(path)
            .lines()
            .filter(|l| !l.trim().is_empty())
            .count();
        if actual != expected {
            return Err(VerificationError::LineCountMismatch {
                path: path.display().to_string(),
                expected,
                actual,
            });
        }
        Ok(())
    }
}
