//! Reader for the classic NetCDF container (CDF-1, CDF-2, CDF-5).
//!
//! The classic container is a self-describing big-endian layout: a header
//! listing dimensions, attributes, and variables, followed by fixed-offset
//! data. Non-record variables live contiguously at their `begin` offset;
//! record variables are interleaved one slab per record, `recsize` bytes
//! apart. Everything here follows the on-disk grammar of the format spec.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use byteorder::{BigEndian, ReadBytesExt};

use crate::error::NcError;
use crate::{NetcdfFile, VarData};

const TAG_DIMENSION: u32 = 0x0A;
const TAG_VARIABLE: u32 = 0x0B;
const TAG_ATTRIBUTE: u32 = 0x0C;

/// Upper bound on elements materialized by a single read. The metadata
/// variables we care about (time axes, cell vectors, thermostat arrays) are
/// tiny; this guards against a request for a full coordinate array on a
/// pathological file.
const MAX_ELEMENTS: usize = 1 << 26;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Version {
    Cdf1,
    Cdf2,
    Cdf5,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NcType {
    Byte,
    Char,
    Short,
    Int,
    Float,
    Double,
    UByte,
    UShort,
    UInt,
    Int64,
    UInt64,
}

impl NcType {
    fn from_id(id: u32) -> Result<Self, NcError> {
        Ok(match id {
            1 => NcType::Byte,
            2 => NcType::Char,
            3 => NcType::Short,
            4 => NcType::Int,
            5 => NcType::Float,
            6 => NcType::Double,
            7 => NcType::UByte,
            8 => NcType::UShort,
            9 => NcType::UInt,
            10 => NcType::Int64,
            11 => NcType::UInt64,
            other => return Err(NcError::UnsupportedType(other)),
        })
    }

    fn size(&self) -> u64 {
        match self {
            NcType::Byte | NcType::Char | NcType::UByte => 1,
            NcType::Short | NcType::UShort => 2,
            NcType::Int | NcType::Float | NcType::UInt => 4,
            NcType::Double | NcType::Int64 | NcType::UInt64 => 8,
        }
    }
}

#[derive(Debug, Clone)]
struct Dim {
    name: String,
    len: usize,
}

#[derive(Debug, Clone)]
enum AttrValue {
    Text(String),
    Numbers(Vec<f64>),
}

#[derive(Debug, Clone)]
struct Var {
    name: String,
    dimids: Vec<usize>,
    nc_type: NcType,
    begin: u64,
    is_record: bool,
}

/// An open classic-format file: parsed header plus the reader positioned
/// for data access.
pub struct ClassicFile {
    reader: BufReader<File>,
    numrecs: u64,
    dims: Vec<Dim>,
    attrs: Vec<(String, AttrValue)>,
    vars: Vec<Var>,
    recsize: u64,
}

impl ClassicFile {
    pub fn open(path: &Path) -> Result<Self, NcError> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic[..3] != b"CDF" {
            return Err(NcError::BadMagic);
        }
        let version = match magic[3] {
            1 => Version::Cdf1,
            2 => Version::Cdf2,
            5 => Version::Cdf5,
            other => return Err(NcError::UnsupportedVersion(other)),
        };

        let mut header = HeaderReader { reader, version };
        let raw_numrecs = header.read_size()?;
        let dims = header.read_dim_list()?;
        let attrs = header.read_attr_list()?;
        let vars = header.read_var_list(&dims)?;

        // Record slab stride: padded slab sizes summed over record
        // variables. A lone byte/char/short record variable packs without
        // padding.
        let record_vars: Vec<&Var> = vars.iter().filter(|v| v.is_record).collect();
        let slab = |v: &Var| -> u64 {
            let elems: u64 = v.dimids[1..]
                .iter()
                .map(|&d| dims[d].len as u64)
                .product();
            elems * v.nc_type.size()
        };
        let recsize = if record_vars.len() == 1 && record_vars[0].nc_type.size() < 4 {
            slab(record_vars[0])
        } else {
            record_vars.iter().map(|&v| round4(slab(v))).sum()
        };

        // All-ones means "streaming": the writer never came back to patch
        // the count, so recover it from the file length.
        let streaming = match version {
            Version::Cdf5 => raw_numrecs == u64::MAX,
            _ => raw_numrecs == u32::MAX as u64,
        };
        let numrecs = if streaming {
            match record_vars.iter().map(|v| v.begin).min() {
                Some(first) if recsize > 0 && file_len > first => (file_len - first) / recsize,
                _ => 0,
            }
        } else {
            raw_numrecs
        };

        Ok(Self {
            reader: header.reader,
            numrecs,
            dims,
            attrs,
            vars,
            recsize,
        })
    }

    fn var(&self, name: &str) -> Option<&Var> {
        self.vars.iter().find(|v| v.name == name)
    }

    fn shape_of(&self, var: &Var) -> Vec<usize> {
        var.dimids
            .iter()
            .enumerate()
            .map(|(i, &d)| {
                if var.is_record && i == 0 {
                    self.numrecs as usize
                } else {
                    self.dims[d].len
                }
            })
            .collect()
    }
}

impl NetcdfFile for ClassicFile {
    fn attribute(&self, name: &str) -> Option<String> {
        self.attrs.iter().find(|(n, _)| n == name).map(|(_, v)| match v {
            AttrValue::Text(s) => s.clone(),
            AttrValue::Numbers(ns) => ns
                .iter()
                .map(|n| n.to_string())
                .collect::<Vec<_>>()
                .join(" "),
        })
    }

    fn dimension_len(&self, name: &str) -> Option<usize> {
        self.dims.iter().find(|d| d.name == name).map(|d| {
            if d.len == 0 {
                self.numrecs as usize
            } else {
                d.len
            }
        })
    }

    fn has_variable(&self, name: &str) -> bool {
        self.var(name).is_some()
    }

    fn variable_shape(&self, name: &str) -> Option<Vec<usize>> {
        self.var(name).map(|v| self.shape_of(v))
    }

    fn read_variable(&mut self, name: &str) -> Result<VarData, NcError> {
        let var = self
            .var(name)
            .ok_or_else(|| NcError::NoSuchVariable(name.to_string()))?
            .clone();
        let shape = self.shape_of(&var);
        let total: usize = shape.iter().product::<usize>().max(1);
        if total > MAX_ELEMENTS {
            return Err(NcError::VariableTooLarge {
                name: var.name,
                elements: total,
            });
        }

        let mut values = Vec::with_capacity(total);
        if var.is_record {
            let slab_elems: usize = shape[1..].iter().product::<usize>().max(1);
            for rec in 0..self.numrecs {
                self.reader
                    .seek(SeekFrom::Start(var.begin + rec * self.recsize))?;
                read_values(&mut self.reader, var.nc_type, slab_elems, &mut values)?;
            }
        } else {
            self.reader.seek(SeekFrom::Start(var.begin))?;
            read_values(&mut self.reader, var.nc_type, total, &mut values)?;
        }

        Ok(VarData { values, shape })
    }
}

fn round4(n: u64) -> u64 {
    n.div_ceil(4) * 4
}

fn read_values(
    reader: &mut BufReader<File>,
    nc_type: NcType,
    count: usize,
    out: &mut Vec<f64>,
) -> Result<(), NcError> {
    for _ in 0..count {
        let v = match nc_type {
            NcType::Byte => reader.read_i8()? as f64,
            NcType::Char | NcType::UByte => reader.read_u8()? as f64,
            NcType::Short => reader.read_i16::<BigEndian>()? as f64,
            NcType::UShort => reader.read_u16::<BigEndian>()? as f64,
            NcType::Int => reader.read_i32::<BigEndian>()? as f64,
            NcType::UInt => reader.read_u32::<BigEndian>()? as f64,
            NcType::Float => reader.read_f32::<BigEndian>()? as f64,
            NcType::Double => reader.read_f64::<BigEndian>()?,
            NcType::Int64 => reader.read_i64::<BigEndian>()? as f64,
            NcType::UInt64 => reader.read_u64::<BigEndian>()? as f64,
        };
        out.push(v);
    }
    Ok(())
}

struct HeaderReader {
    reader: BufReader<File>,
    version: Version,
}

impl HeaderReader {
    /// A NON_NEG header count: 4 bytes for CDF-1/2, 8 for CDF-5.
    fn read_size(&mut self) -> Result<u64, NcError> {
        match self.version {
            Version::Cdf5 => Ok(self.reader.read_u64::<BigEndian>()?),
            _ => Ok(self.reader.read_u32::<BigEndian>()? as u64),
        }
    }

    /// Variable data offsets: 4 bytes in CDF-1, 8 in CDF-2/5.
    fn read_begin(&mut self) -> Result<u64, NcError> {
        match self.version {
            Version::Cdf1 => Ok(self.reader.read_u32::<BigEndian>()? as u64),
            _ => Ok(self.reader.read_u64::<BigEndian>()?),
        }
    }

    fn read_name(&mut self) -> Result<String, NcError> {
        let len = self.read_size()? as usize;
        if len > 1 << 16 {
            return Err(NcError::MalformedHeader(format!(
                "name length {len} is implausible"
            )));
        }
        let mut buf = vec![0u8; len];
        self.reader.read_exact(&mut buf)?;
        self.skip_padding(len as u64)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    fn skip_padding(&mut self, consumed: u64) -> Result<(), NcError> {
        let pad = (round4(consumed) - consumed) as usize;
        if pad > 0 {
            let mut sink = [0u8; 4];
            self.reader.read_exact(&mut sink[..pad])?;
        }
        Ok(())
    }

    /// A tagged list header: `(tag, nelems)` where `(0, 0)` means absent.
    fn read_list_header(&mut self, expected_tag: u32) -> Result<u64, NcError> {
        let tag = self.reader.read_u32::<BigEndian>()?;
        let nelems = self.read_size()?;
        if tag == 0 && nelems == 0 {
            return Ok(0);
        }
        if tag != expected_tag {
            return Err(NcError::MalformedHeader(format!(
                "expected list tag {expected_tag:#x}, found {tag:#x}"
            )));
        }
        Ok(nelems)
    }

    fn read_dim_list(&mut self) -> Result<Vec<Dim>, NcError> {
        let n = self.read_list_header(TAG_DIMENSION)?;
        let mut dims = Vec::new();
        for _ in 0..n {
            let name = self.read_name()?;
            let len = self.read_size()? as usize;
            dims.push(Dim { name, len });
        }
        Ok(dims)
    }

    fn read_attr_list(&mut self) -> Result<Vec<(String, AttrValue)>, NcError> {
        let n = self.read_list_header(TAG_ATTRIBUTE)?;
        let mut attrs = Vec::new();
        for _ in 0..n {
            let name = self.read_name()?;
            let nc_type = NcType::from_id(self.reader.read_u32::<BigEndian>()?)?;
            let nelems = self.read_size()? as usize;
            let value = match nc_type {
                NcType::Char => {
                    let mut buf = vec![0u8; nelems];
                    self.reader.read_exact(&mut buf)?;
                    self.skip_padding(nelems as u64)?;
                    let text = String::from_utf8_lossy(&buf)
                        .trim_end_matches('\0')
                        .to_string();
                    AttrValue::Text(text)
                }
                _ => {
                    let mut values = Vec::new();
                    for _ in 0..nelems {
                        values.push(read_scalar(&mut self.reader, nc_type)?);
                    }
                    self.skip_padding(nelems as u64 * nc_type.size())?;
                    AttrValue::Numbers(values)
                }
            };
            attrs.push((name, value));
        }
        Ok(attrs)
    }

    fn read_var_list(&mut self, dims: &[Dim]) -> Result<Vec<Var>, NcError> {
        let n = self.read_list_header(TAG_VARIABLE)?;
        let mut vars = Vec::new();
        for _ in 0..n {
            let name = self.read_name()?;
            let ndims = self.read_size()? as usize;
            let mut dimids = Vec::new();
            for _ in 0..ndims {
                let id = self.reader.read_u32::<BigEndian>()? as usize;
                if id >= dims.len() {
                    return Err(NcError::MalformedHeader(format!(
                        "variable {name} references dimension {id} of {}",
                        dims.len()
                    )));
                }
                dimids.push(id);
            }
            // Per-variable attributes are skipped; nothing upstream needs
            // them yet.
            self.skip_attr_list()?;
            let nc_type = NcType::from_id(self.reader.read_u32::<BigEndian>()?)?;
            let _vsize = self.read_size()?;
            let begin = self.read_begin()?;
            let is_record = dimids.first().is_some_and(|&d| dims[d].len == 0);
            vars.push(Var {
                name,
                dimids,
                nc_type,
                begin,
                is_record,
            });
        }
        Ok(vars)
    }

    fn skip_attr_list(&mut self) -> Result<(), NcError> {
        let n = self.read_list_header(TAG_ATTRIBUTE)?;
        for _ in 0..n {
            let _name = self.read_name()?;
            let nc_type = NcType::from_id(self.reader.read_u32::<BigEndian>()?)?;
            let nelems = self.read_size()?;
            let bytes = round4(nelems * nc_type.size());
            self.reader.seek_relative(bytes as i64)?;
        }
        Ok(())
    }
}

fn read_scalar(reader: &mut BufReader<File>, nc_type: NcType) -> Result<f64, NcError> {
    let mut one = Vec::with_capacity(1);
    read_values(reader, nc_type, 1, &mut one)?;
    Ok(one[0])
}
