//! Reading the descriptor set written by `protoc-c -o<path>`

use bytes::Bytes;
use log::debug;
use prost::Message;
use prost_types::{FileDescriptorProto, FileDescriptorSet};
use serde::Serialize;
use std::error::Error;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

#[derive(Debug)]
pub enum DescriptorError {
    Io(io::Error),
    Decode(prost::DecodeError),
}

impl fmt::Display for DescriptorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DescriptorError::Io(err) => write!(f, "Failed to read descriptor set: {}", err),
            DescriptorError::Decode(err) => write!(f, "Invalid descriptor set: {}", err),
        }
    }
}

impl Error for DescriptorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DescriptorError::Io(err) => Some(err),
            DescriptorError::Decode(err) => Some(err),
        }
    }
}

impl From<io::Error> for DescriptorError {
    fn from(err: io::Error) -> Self {
        DescriptorError::Io(err)
    }
}

impl From<prost::DecodeError> for DescriptorError {
    fn from(err: prost::DecodeError) -> Self {
        DescriptorError::Decode(err)
    }
}

/// Overview of one file in a descriptor set
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileSummary {
    pub name: String,
    pub package: Option<String>,
    pub syntax: Option<String>,
    pub dependencies: Vec<String>,
    pub messages: usize,
    pub enums: usize,
    pub services: usize,
}

impl From<&FileDescriptorProto> for FileSummary {
    fn from(file: &FileDescriptorProto) -> Self {
        FileSummary {
            name: file.name().to_string(),
            package: file.package.clone(),
            syntax: file.syntax.clone(),
            dependencies: file.dependency.clone(),
            messages: file.message_type.len(),
            enums: file.enum_type.len(),
            services: file.service.len(),
        }
    }
}

pub fn decode_descriptor_set(data: Bytes) -> Result<FileDescriptorSet, DescriptorError> {
    Ok(FileDescriptorSet::decode(data)?)
}

pub fn load_descriptor_set<P: AsRef<Path>>(path: P) -> Result<FileDescriptorSet, DescriptorError> {
    let data = fs::read(path.as_ref())?;
    debug!("Read {} bytes from {}", data.len(), path.as_ref().display());
    decode_descriptor_set(Bytes::from(data))
}

pub fn summarize(set: &FileDescriptorSet) -> Vec<FileSummary> {
    set.file.iter().map(FileSummary::from).collect()
}
