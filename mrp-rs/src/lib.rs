mod error;

use std::collections::HashMap;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};

pub use error::{MrpError, Result};

pub const MANIFEST_FILENAME: &str = "run_manifest.json";

pub struct Environment<I = ()> {
    input_json: serde_json::Map<String, Value>,
    pub input: Option<I>,
    pub seed: u64,
    pub replicate: u64,
    pub files: HashMap<String, PathBuf>,
    output: Value,
}

impl Environment {
    pub fn from_json(data: Value) -> Self {
        let mut input_json = data
            .get("input")
            .and_then(|v| v.as_object())
            .cloned()
            .unwrap_or_default();

        let seed = input_json
            .remove("seed")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);

        let replicate = input_json
            .remove("replicate")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);

        let files = data
            .get("model")
            .and_then(|m| m.get("files"))
            .and_then(|f| f.as_object())
            .map(|obj| {
                obj.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), PathBuf::from(s))))
                    .collect()
            })
            .unwrap_or_default();

        let output = data.get("output").cloned().unwrap_or(Value::Null);

        Self {
            input_json,
            input: None,
            seed,
            replicate,
            files,
            output,
        }
    }

    pub fn parse_json(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Err(MrpError::EmptyInput);
        }
        let data: Value = serde_json::from_str(raw)?;
        Ok(Self::from_json(data))
    }

    pub fn parse_toml(raw: &str) -> Result<Self> {
        let data: Value = toml::from_str(raw)?;
        Ok(Self::from_json(data))
    }

    pub fn from_stdin() -> Result<Self> {
        let mut raw = String::new();
        io::stdin().read_to_string(&mut raw)?;
        Self::parse_json(&raw)
    }

    /// Reads a run description from disk; the extension selects JSON or TOML.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::parse_json(&raw),
            Some("toml") => Self::parse_toml(&raw),
            _ => Err(MrpError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    pub fn with_input_type<I: DeserializeOwned>(self) -> Result<Environment<I>> {
        let input_value = Value::Object(self.input_json.clone());
        let input =
            serde_json::from_value(input_value).map_err(|e| MrpError::Input(e.to_string()))?;
        Ok(Environment {
            input_json: self.input_json,
            input: Some(input),
            seed: self.seed,
            replicate: self.replicate,
            files: self.files,
            output: self.output,
        })
    }
}

impl<I: DeserializeOwned> Environment<I> {
    pub fn load() -> Result<Self> {
        Environment::from_stdin()?.with_input_type::<I>()
    }
}

impl<I> Environment<I> {
    pub fn input_json(&self) -> &serde_json::Map<String, Value> {
        &self.input_json
    }

    pub fn output_dir(&self) -> Option<PathBuf> {
        let output = &self.output;

        // Check flat output
        if output.get("spec").and_then(|v| v.as_str()) == Some("filesystem") {
            if let Some(dir) = output.get("dir").and_then(|v| v.as_str()) {
                return Some(PathBuf::from(dir));
            }
            return None;
        }

        // Check profiled output, preferring the default profile
        if let Some(profiles) = output.get("profile").and_then(|v| v.as_object()) {
            let selected = profiles
                .get("default")
                .or_else(|| profiles.values().next());
            if let Some(profile) = selected {
                if profile.get("spec").and_then(|v| v.as_str()) == Some("filesystem") {
                    if let Some(dir) = profile.get("dir").and_then(|v| v.as_str()) {
                        return Some(PathBuf::from(dir));
                    }
                }
            }
        }

        None
    }

    pub fn file(&self, name: &str) -> Result<&Path> {
        self.files
            .get(name)
            .map(PathBuf::as_path)
            .ok_or_else(|| MrpError::MissingFile(name.to_string()))
    }

    /// Deserializes every record of a named input file. The first row is a header.
    pub fn read_csv<T: DeserializeOwned>(&self, name: &str) -> Result<Vec<T>> {
        let path = self.file(name)?;
        tracing::debug!(file = name, path = %path.display(), "reading csv input");
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
        let mut records = Vec::new();
        for record in rdr.deserialize() {
            records.push(record?);
        }
        Ok(records)
    }

    /// SHA-256 of the input section (keys sorted), seed and replicate.
    pub fn input_digest(&self) -> String {
        let canonical = json!({
            "input": Value::Object(self.input_json.clone()),
            "seed": self.seed,
            "replicate": self.replicate,
        });
        hex::encode(Sha256::digest(canonical.to_string().as_bytes()))
    }

    pub fn write(&self, filename: &str, data: &[u8]) -> Result<()> {
        if let Some(dir) = self.output_dir() {
            fs::create_dir_all(&dir)?;
            fs::write(dir.join(filename), data)?;
        } else {
            io::stdout().write_all(data)?;
        }
        Ok(())
    }

    pub fn write_csv(&self, filename: &str, headers: &[&str], rows: &[Vec<String>]) -> Result<()> {
        if let Some(dir) = self.output_dir() {
            fs::create_dir_all(&dir)?;
            let file = fs::File::create(dir.join(filename))?;
            write_rows(csv::Writer::from_writer(file), headers, rows)?;
            tracing::debug!(file = filename, rows = rows.len(), "wrote csv output");
        } else {
            write_rows(csv::Writer::from_writer(io::stdout()), headers, rows)?;
        }
        Ok(())
    }

    /// Records what produced the outputs. Only filesystem outputs get a manifest.
    pub fn write_manifest(&self) -> Result<()> {
        let Some(dir) = self.output_dir() else {
            return Ok(());
        };
        let manifest = json!({
            "input_sha256": self.input_digest(),
            "seed": self.seed,
            "replicate": self.replicate,
        });
        fs::create_dir_all(&dir)?;
        fs::write(
            dir.join(MANIFEST_FILENAME),
            serde_json::to_vec_pretty(&manifest)?,
        )?;
        Ok(())
    }
}

fn write_rows<W: Write>(mut wtr: csv::Writer<W>, headers: &[&str], rows: &[Vec<String>]) -> Result<()> {
    wtr.write_record(headers)?;
    for row in rows {
        wtr.write_record(row)?;
    }
    wtr.flush()?;
    Ok(())
}
