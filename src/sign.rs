// src/sign.rs

//! Signature verification context
//!
//! A signed container is one logical tar split across three gzip members:
//! signature entries, control files, then data. The context plugs into the
//! multipart gzip reader as a hook, digesting the compressed bytes of each
//! section, and is fed the tar entries of the signature and control
//! sections by the archive consumer. `control_verified` and
//! `data_verified` flip as each signed section completes; nothing should
//! be trusted before both are set.
//!
//! A signature entry is named `.SIGN.SHA256.<key>` and holds the hex
//! digest of the control section's compressed bytes; the signature is
//! accepted only when `<key>` exists in the keys directory. The control
//! section's `.DATAHASH` entry pins the data section the same way.

use std::cell::RefCell;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::packages::scalars::to_hex;
use crate::stream::{MpartDecision, MpartEvent, MultipartHook};

/// Entry name prefix of a signature in the signature section.
pub const SIGNATURE_PREFIX: &str = ".SIGN.SHA256.";
/// Entry name of the data-section digest in the control section.
pub const DATAHASH_ENTRY: &str = ".DATAHASH";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Signature,
    Control,
    Data,
}

/// Verification state for one signed container.
pub struct SignCtx {
    keys_dir: PathBuf,
    section: Section,
    hasher: Sha256,
    signatures: Vec<(String, String)>,
    datahash: Option<String>,
    pub control_verified: bool,
    pub data_verified: bool,
}

impl SignCtx {
    pub fn new(keys_dir: impl AsRef<Path>) -> SignCtx {
        SignCtx {
            keys_dir: keys_dir.as_ref().to_path_buf(),
            section: Section::Signature,
            hasher: Sha256::new(),
            signatures: Vec::new(),
            datahash: None,
            control_verified: false,
            data_verified: false,
        }
    }

    /// Feed one tar entry encountered while walking the archive. Only
    /// signature and control metadata entries are meaningful.
    pub fn process_entry(&mut self, name: &str, content: &[u8]) {
        if let Some(key) = name.strip_prefix(SIGNATURE_PREFIX) {
            let sig = String::from_utf8_lossy(content).trim().to_string();
            debug!("signature entry for key {key}");
            self.signatures.push((key.to_string(), sig));
        } else if name == DATAHASH_ENTRY {
            self.datahash = Some(String::from_utf8_lossy(content).trim().to_string());
        }
    }

    fn on_part(&mut self, event: MpartEvent, data: &[u8]) -> io::Result<MpartDecision> {
        match event {
            MpartEvent::Data => {
                if self.section != Section::Signature {
                    self.hasher.update(data);
                }
            }
            MpartEvent::Boundary => match self.section {
                Section::Signature => {
                    self.section = Section::Control;
                    self.hasher = Sha256::new();
                }
                Section::Control => {
                    let digest = to_hex(std::mem::take(&mut self.hasher).finalize().as_slice());
                    self.control_verified = self.check_control(&digest);
                    self.section = Section::Data;
                    self.hasher = Sha256::new();
                }
                // Further boundaries keep accumulating into the data
                // digest.
                Section::Data => {}
            },
            MpartEvent::End => {
                if self.section == Section::Data {
                    let digest = to_hex(std::mem::take(&mut self.hasher).finalize().as_slice());
                    self.data_verified = self.datahash.as_deref() == Some(digest.as_str());
                }
            }
        }
        Ok(MpartDecision::Continue)
    }

    fn check_control(&self, digest: &str) -> bool {
        for (key, sig) in &self.signatures {
            if !self.keys_dir.join(key).is_file() {
                debug!("ignoring signature from unknown key {key}");
                continue;
            }
            if sig == digest {
                return true;
            }
        }
        false
    }
}

/// Shared handle so the same context can serve as the gzip multipart hook
/// while the tar walker feeds it entries. Single-threaded by design.
#[derive(Clone)]
pub struct SharedSignCtx(Rc<RefCell<SignCtx>>);

impl SharedSignCtx {
    pub fn new(keys_dir: impl AsRef<Path>) -> SharedSignCtx {
        SharedSignCtx(Rc::new(RefCell::new(SignCtx::new(keys_dir))))
    }

    pub fn process_entry(&self, name: &str, content: &[u8]) {
        self.0.borrow_mut().process_entry(name, content);
    }

    pub fn control_verified(&self) -> bool {
        self.0.borrow().control_verified
    }

    pub fn data_verified(&self) -> bool {
        self.0.borrow().data_verified
    }
}

impl MultipartHook for SharedSignCtx {
    fn on_part(&mut self, event: MpartEvent, data: &[u8]) -> io::Result<MpartDecision> {
        self.0.borrow_mut().on_part(event, data)
    }
}
