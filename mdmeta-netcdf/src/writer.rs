//! Minimal classic-format (CDF-1) writer.
//!
//! Only what the test fixtures need: fixed and record dimensions, global
//! character attributes, and int/float/double variables. Kept outside
//! `#[cfg(test)]` so downstream crates can build fixture files in their own
//! tests.

use std::path::Path;

use byteorder::{BigEndian, WriteBytesExt};

const TAG_DIMENSION: u32 = 0x0A;
const TAG_VARIABLE: u32 = 0x0B;
const TAG_ATTRIBUTE: u32 = 0x0C;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NcDim {
    Fixed(usize),
    Record,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterType {
    Int,
    Float,
    Double,
}

impl WriterType {
    fn id(&self) -> u32 {
        match self {
            WriterType::Int => 4,
            WriterType::Float => 5,
            WriterType::Double => 6,
        }
    }

    fn size(&self) -> u64 {
        match self {
            WriterType::Int | WriterType::Float => 4,
            WriterType::Double => 8,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NcVarSpec {
    name: String,
    dimids: Vec<usize>,
    kind: WriterType,
}

impl NcVarSpec {
    pub fn int(name: &str, dimids: Vec<usize>) -> Self {
        Self {
            name: name.to_string(),
            dimids,
            kind: WriterType::Int,
        }
    }

    pub fn float(name: &str, dimids: Vec<usize>) -> Self {
        Self {
            name: name.to_string(),
            dimids,
            kind: WriterType::Float,
        }
    }

    pub fn double(name: &str, dimids: Vec<usize>) -> Self {
        Self {
            name: name.to_string(),
            dimids,
            kind: WriterType::Double,
        }
    }
}

struct WriterVar {
    spec: NcVarSpec,
    data: Vec<f64>,
}

#[derive(Default)]
pub struct NcWriter {
    dims: Vec<(String, NcDim)>,
    attrs: Vec<(String, String)>,
    vars: Vec<WriterVar>,
    numrecs: u32,
}

impl NcWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a dimension; the returned id is what `NcVarSpec` takes.
    pub fn dim(&mut self, name: &str, dim: NcDim) -> usize {
        self.dims.push((name.to_string(), dim));
        self.dims.len() - 1
    }

    pub fn global_attr(&mut self, name: &str, value: &str) {
        self.attrs.push((name.to_string(), value.to_string()));
    }

    pub fn set_numrecs(&mut self, n: u32) {
        self.numrecs = n;
    }

    pub fn var(&mut self, spec: NcVarSpec, data: Vec<f64>) {
        self.vars.push(WriterVar { spec, data });
    }

    pub fn write(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.to_bytes())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        // Two passes: the header length does not depend on the begin
        // values (fixed-width u32 in CDF-1), so serialize once with
        // placeholders to measure, then with real offsets.
        let probe = self.serialize_header(&vec![0u64; self.vars.len()]);
        let header_len = probe.len() as u64;

        let mut begins = Vec::with_capacity(self.vars.len());
        let mut offset = header_len;
        for var in &self.vars {
            if self.is_record_var(var) {
                begins.push(0);
            } else {
                begins.push(offset);
                offset += round4(self.slab_bytes(var));
            }
        }
        for (i, var) in self.vars.iter().enumerate() {
            if self.is_record_var(var) {
                begins[i] = offset;
                offset += round4(self.slab_bytes(var));
            }
        }

        let mut out = self.serialize_header(&begins);

        for var in self.vars.iter().filter(|v| !self.is_record_var(v)) {
            self.write_values(&mut out, var, &var.data);
        }
        for rec in 0..self.numrecs as usize {
            for var in self.vars.iter().filter(|v| self.is_record_var(v)) {
                let slab = self.slab_elems(var);
                let chunk = &var.data[rec * slab..(rec + 1) * slab];
                self.write_values(&mut out, var, chunk);
            }
        }
        out
    }

    fn is_record_var(&self, var: &WriterVar) -> bool {
        var.spec
            .dimids
            .first()
            .is_some_and(|&d| self.dims[d].1 == NcDim::Record)
    }

    fn slab_elems(&self, var: &WriterVar) -> usize {
        let dims = if self.is_record_var(var) {
            &var.spec.dimids[1..]
        } else {
            &var.spec.dimids[..]
        };
        dims.iter()
            .map(|&d| match self.dims[d].1 {
                NcDim::Fixed(n) => n,
                NcDim::Record => 0,
            })
            .product::<usize>()
            .max(1)
    }

    fn slab_bytes(&self, var: &WriterVar) -> u64 {
        self.slab_elems(var) as u64 * var.spec.kind.size()
    }

    fn write_values(&self, out: &mut Vec<u8>, var: &WriterVar, chunk: &[f64]) {
        for &v in chunk {
            match var.spec.kind {
                WriterType::Int => out.write_i32::<BigEndian>(v as i32).unwrap(),
                WriterType::Float => out.write_f32::<BigEndian>(v as f32).unwrap(),
                WriterType::Double => out.write_f64::<BigEndian>(v).unwrap(),
            }
        }
        let written = chunk.len() as u64 * var.spec.kind.size();
        for _ in 0..(round4(written) - written) {
            out.push(0);
        }
    }

    fn serialize_header(&self, begins: &[u64]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"CDF\x01");
        out.write_u32::<BigEndian>(self.numrecs).unwrap();

        write_list_header(&mut out, TAG_DIMENSION, self.dims.len());
        for (name, dim) in &self.dims {
            write_name(&mut out, name);
            let len = match dim {
                NcDim::Fixed(n) => *n as u32,
                NcDim::Record => 0,
            };
            out.write_u32::<BigEndian>(len).unwrap();
        }

        write_list_header(&mut out, TAG_ATTRIBUTE, self.attrs.len());
        for (name, value) in &self.attrs {
            write_name(&mut out, name);
            out.write_u32::<BigEndian>(2).unwrap(); // NC_CHAR
            out.write_u32::<BigEndian>(value.len() as u32).unwrap();
            out.extend_from_slice(value.as_bytes());
            pad4(&mut out, value.len());
        }

        write_list_header(&mut out, TAG_VARIABLE, self.vars.len());
        for (var, &begin) in self.vars.iter().zip(begins) {
            write_name(&mut out, &var.spec.name);
            out.write_u32::<BigEndian>(var.spec.dimids.len() as u32)
                .unwrap();
            for &d in &var.spec.dimids {
                out.write_u32::<BigEndian>(d as u32).unwrap();
            }
            write_list_header(&mut out, 0, 0); // no per-variable attributes
            out.write_u32::<BigEndian>(var.spec.kind.id()).unwrap();
            out.write_u32::<BigEndian>(round4(self.slab_bytes(var)) as u32)
                .unwrap();
            out.write_u32::<BigEndian>(begin as u32).unwrap();
        }

        out
    }
}

fn round4(n: u64) -> u64 {
    n.div_ceil(4) * 4
}

fn pad4(out: &mut Vec<u8>, written: usize) {
    for _ in 0..(round4(written as u64) - written as u64) {
        out.push(0);
    }
}

fn write_name(out: &mut Vec<u8>, name: &str) {
    out.write_u32::<BigEndian>(name.len() as u32).unwrap();
    out.extend_from_slice(name.as_bytes());
    pad4(out, name.len());
}

fn write_list_header(out: &mut Vec<u8>, tag: u32, nelems: usize) {
    out.write_u32::<BigEndian>(tag).unwrap();
    out.write_u32::<BigEndian>(nelems as u32).unwrap();
}
