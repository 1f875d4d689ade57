//! Compiled contract artifacts
//!
//! Artifacts are produced by an external toolchain and looked up by contract
//! name. Two layouts are understood:
//!
//! - Hardhat: `artifacts/contracts/<Source>.sol/<Name>.json`, `bytecode` is a hex string
//! - Foundry: `out/<Source>.sol/<Name>.json`, `bytecode.object` is a hex string
//!
//! A fully qualified name (`contracts/MyNFT.sol:MyNFT`) selects one artifact
//! when several sources define a contract with the same name.

use ethers::abi::token::{LenientTokenizer, Tokenizer};
use ethers::abi::{Abi, Token};
use ethers::types::Bytes;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{DeployError, Result};

/// A deployable contract: interface plus creation bytecode
#[derive(Debug, Clone)]
pub struct Artifact {
    pub contract_name: String,
    pub source_name: Option<String>,
    /// File the artifact was read from
    pub path: PathBuf,
    pub abi: Abi,
    pub bytecode: Bytes,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawArtifact {
    #[serde(default)]
    contract_name: Option<String>,
    #[serde(default)]
    source_name: Option<String>,
    abi: Abi,
    bytecode: RawBytecode,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawBytecode {
    Hex(String),
    Object { object: String },
}

impl RawBytecode {
    fn as_hex(&self) -> &str {
        match self {
            RawBytecode::Hex(hex) => hex,
            RawBytecode::Object { object } => object,
        }
    }
}

/// Hardhat debug file pointing at the build-info of a compilation
#[derive(Deserialize)]
struct DebugFile {
    #[serde(rename = "buildInfo")]
    build_info: PathBuf,
}

#[derive(Deserialize)]
struct BuildInfo {
    #[serde(rename = "solcVersion")]
    solc_version: String,
}

impl Artifact {
    /// Parse an artifact file's contents
    pub fn from_json(path: &Path, json: &str) -> Result<Self> {
        let raw: RawArtifact = serde_json::from_str(json)
            .map_err(|e| DeployError::invalid_artifact(path, e.to_string()))?;

        let hex = raw.bytecode.as_hex();
        if hex.contains("__") {
            return Err(DeployError::invalid_artifact(
                path,
                "bytecode contains unlinked library references",
            ));
        }
        let bytecode: Bytes = if hex.is_empty() {
            Bytes::default()
        } else {
            hex.parse()
                .map_err(|e| DeployError::invalid_artifact(path, format!("bad bytecode: {e}")))?
        };

        let contract_name = raw
            .contract_name
            .or_else(|| artifact_stem(path))
            .ok_or_else(|| DeployError::invalid_artifact(path, "cannot determine contract name"))?;

        Ok(Artifact {
            contract_name,
            source_name: raw.source_name,
            path: path.to_path_buf(),
            abi: raw.abi,
            bytecode,
        })
    }

    /// Interfaces and abstract contracts compile to empty bytecode
    pub fn is_deployable(&self) -> bool {
        !self.bytecode.is_empty()
    }

    /// Creation code with ABI-encoded constructor arguments appended
    ///
    /// Arguments are given as text and parsed against the constructor's
    /// parameter types (`0x…` addresses, decimal integers, `true`/`false`, …).
    pub fn creation_code(&self, args: &[String]) -> Result<Bytes> {
        if !self.is_deployable() {
            return Err(DeployError::invalid_artifact(
                &self.path,
                format!("{} has no deployable bytecode", self.contract_name),
            ));
        }

        let Some(constructor) = self.abi.constructor() else {
            if args.is_empty() {
                return Ok(self.bytecode.clone());
            }
            return Err(DeployError::invalid_artifact(
                &self.path,
                format!("{} takes no constructor arguments", self.contract_name),
            ));
        };

        if constructor.inputs.len() != args.len() {
            return Err(DeployError::invalid_artifact(
                &self.path,
                format!(
                    "constructor of {} expects {} argument(s), got {}",
                    self.contract_name,
                    constructor.inputs.len(),
                    args.len()
                ),
            ));
        }

        let tokens = constructor
            .inputs
            .iter()
            .zip(args)
            .map(|(param, value)| {
                LenientTokenizer::tokenize(&param.kind, value).map_err(|e| {
                    DeployError::invalid_artifact(
                        &self.path,
                        format!("argument '{}' ({}): {e}", param.name, param.kind),
                    )
                })
            })
            .collect::<Result<Vec<Token>>>()?;

        let code = constructor
            .encode_input(self.bytecode.to_vec(), &tokens)
            .map_err(|e| DeployError::invalid_artifact(&self.path, e.to_string()))?;

        Ok(code.into())
    }
}

/// Lookup of artifacts beneath one build output directory
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a contract by plain or fully qualified name
    ///
    /// This only touches the local filesystem.
    pub fn resolve(&self, name: &str) -> Result<Artifact> {
        let (source, contract) = match name.rsplit_once(':') {
            Some((source, contract)) => (Some(source), contract),
            None => (None, name),
        };

        let not_found = || DeployError::ArtifactNotFound {
            name: name.to_string(),
            dir: self.root.clone(),
        };

        if contract.is_empty() || !self.root.is_dir() {
            return Err(not_found());
        }

        let mut matches: Vec<PathBuf> = self
            .artifact_files()?
            .into_iter()
            .filter(|path| artifact_stem(path).as_deref() == Some(contract))
            .filter(|path| match source {
                Some(source) => path
                    .parent()
                    .map(|dir| source_matches(dir, source))
                    .unwrap_or(false),
                None => true,
            })
            .collect();

        match matches.len() {
            0 => Err(not_found()),
            1 => {
                let path = matches.remove(0);
                debug!(contract = contract, path = %path.display(), "Resolved artifact");
                let json = std::fs::read_to_string(&path)?;
                Artifact::from_json(&path, &json)
            }
            _ => Err(DeployError::invalid_artifact(
                &self.root,
                format!(
                    "'{}' is ambiguous ({} artifacts); use <source>.sol:{}",
                    name,
                    matches.len(),
                    contract
                ),
            )),
        }
    }

    /// Names of every contract with deployable bytecode, sorted
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for path in self.artifact_files()? {
            let json = std::fs::read_to_string(&path)?;
            match Artifact::from_json(&path, &json) {
                Ok(artifact) if artifact.is_deployable() => names.push(artifact.contract_name),
                Ok(_) => {}
                Err(e) => debug!(path = %path.display(), error = %e, "Skipping unreadable artifact"),
            }
        }

        names.sort();
        names.dedup();
        Ok(names)
    }

    /// Compiler version recorded by Hardhat for this artifact, if available
    pub fn compiler_version(&self, artifact: &Artifact) -> Option<String> {
        let stem = artifact_stem(&artifact.path)?;
        let dbg_path = artifact.path.with_file_name(format!("{stem}.dbg.json"));
        let dbg: DebugFile = serde_json::from_str(&std::fs::read_to_string(&dbg_path).ok()?).ok()?;

        let build_info_path = dbg_path.parent()?.join(dbg.build_info);
        let build_info: BuildInfo =
            serde_json::from_str(&std::fs::read_to_string(build_info_path).ok()?).ok()?;
        Some(build_info.solc_version)
    }

    /// All `<Source>.sol/<Name>.json` files under the root, excluding debug and build-info files
    fn artifact_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            for entry in std::fs::read_dir(&dir)? {
                let path = entry?.path();

                if path.is_dir() {
                    if path.file_name().and_then(|n| n.to_str()) != Some("build-info") {
                        pending.push(path);
                    }
                    continue;
                }

                let in_source_dir = path
                    .parent()
                    .and_then(|p| p.file_name())
                    .and_then(|n| n.to_str())
                    .map(|n| n.ends_with(".sol"))
                    .unwrap_or(false);
                let is_artifact = path.extension().and_then(|e| e.to_str()) == Some("json")
                    && !path.to_string_lossy().ends_with(".dbg.json");

                if in_source_dir && is_artifact {
                    files.push(path);
                }
            }
        }

        files.sort();
        Ok(files)
    }
}

/// Hardhat mirrors the source path (`contracts/MyNFT.sol/`) while Foundry
/// keeps only the file name (`out/MyNFT.sol/`)
fn source_matches(dir: &Path, source: &str) -> bool {
    let source = Path::new(source);
    dir.ends_with(source)
        || (source.file_name().is_some() && dir.file_name() == source.file_name())
}

fn artifact_stem(path: &Path) -> Option<String> {
    path.file_stem().and_then(|s| s.to_str()).map(str::to_string)
}
