//! Deterministic CBOR encoding of hash preimages.
//!
//! Op ids and block hashes are digests of these bytes, so the encoding must
//! be identical on every node:
//! - Map keys sorted by encoded byte comparison
//! - Integers use smallest valid encoding
//! - Definite lengths only
//! - No floats (coordinates stay inside the svg text)

use ciborium::value::Value;

use crate::crypto::{PublicKey, Signature};
use crate::op::{Op, OpKind};
use crate::shape::ShapeSpec;
use crate::types::BlockHash;

/// Field keys. Keys 0-23 encode as single bytes.
mod keys {
    pub const KIND: u64 = 0;
    pub const OWNER: u64 = 1;
    pub const SHAPE_TYPE: u64 = 2;
    pub const SVG: u64 = 3;
    pub const FILL: u64 = 4;
    pub const STROKE: u64 = 5;
    pub const CREATED_AT: u64 = 6;
    pub const TARGET: u64 = 7;

    pub const PREV: u64 = 0;
    pub const OPS: u64 = 1;
    pub const MINER: u64 = 2;
}

const KIND_ADD: u64 = 0;
const KIND_DELETE: u64 = 1;

fn int(n: u64) -> Value {
    Value::Integer(n.into())
}

fn spec_entries(spec: &ShapeSpec) -> Vec<(Value, Value)> {
    vec![
        (int(keys::SHAPE_TYPE), int(spec.shape_type.to_u8().into())),
        (int(keys::SVG), Value::Text(spec.svg.clone())),
        (int(keys::FILL), Value::Text(spec.fill.clone())),
        (int(keys::STROKE), Value::Text(spec.stroke.clone())),
        (int(keys::CREATED_AT), Value::Integer(spec.created_at.into())),
    ]
}

/// Bytes an op id is computed over: the op kind, its payload and its owner.
pub fn op_content_bytes(kind: &OpKind, owner: &PublicKey) -> Vec<u8> {
    let mut entries = vec![(int(keys::OWNER), Value::Bytes(owner.0.to_vec()))];
    match kind {
        OpKind::Add(spec) => {
            entries.push((int(keys::KIND), int(KIND_ADD)));
            entries.extend(spec_entries(spec));
        }
        OpKind::Delete(target) => {
            entries.push((int(keys::KIND), int(KIND_DELETE)));
            entries.push((int(keys::TARGET), Value::Bytes(target.0.to_vec())));
        }
    }
    encode_cbor_value_canonical(&Value::Map(entries))
}

/// Bytes of a block without its nonce.
///
/// The block hash is the digest of these bytes followed by the big-endian
/// nonce, so a miner can reuse the hasher state across nonces.
pub fn block_prefix_bytes(prev: &BlockHash, ops: &[Op], miner: &PublicKey) -> Vec<u8> {
    let ops_array: Vec<Value> = ops
        .iter()
        .map(|op| {
            Value::Array(vec![
                Value::Bytes(op.id().0.to_vec()),
                Value::Bytes(signature_bytes(&op.signature)),
            ])
        })
        .collect();

    let entries = vec![
        (int(keys::PREV), Value::Bytes(prev.0.to_vec())),
        (int(keys::OPS), Value::Array(ops_array)),
        (int(keys::MINER), Value::Bytes(miner.0.to_vec())),
    ];
    encode_cbor_value_canonical(&Value::Map(entries))
}

fn signature_bytes(sig: &Signature) -> Vec<u8> {
    sig.0.to_vec()
}

fn encode_cbor_value_canonical(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_value_to(&mut buf, value);
    buf
}

fn encode_value_to(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Integer(i) => encode_integer(buf, *i),
        Value::Bytes(b) => {
            encode_uint(buf, 2, b.len() as u64);
            buf.extend_from_slice(b);
        }
        Value::Text(s) => {
            encode_uint(buf, 3, s.len() as u64);
            buf.extend_from_slice(s.as_bytes());
        }
        Value::Array(arr) => {
            encode_uint(buf, 4, arr.len() as u64);
            for item in arr {
                encode_value_to(buf, item);
            }
        }
        Value::Map(entries) => encode_map_canonical(buf, entries),
        Value::Bool(b) => buf.push(if *b { 0xf5 } else { 0xf4 }),
        Value::Null => buf.push(0xf6),
        _ => panic!("unsupported CBOR value type in hash preimage"),
    }
}

/// Major types 0 and 1.
fn encode_integer(buf: &mut Vec<u8>, i: ciborium::value::Integer) {
    let n: i128 = i.into();
    if n >= 0 {
        encode_uint(buf, 0, n as u64);
    } else {
        // CBOR encodes -1 as 0, -2 as 1, etc.
        encode_uint(buf, 1, (-1 - n) as u64);
    }
}

fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

fn encode_map_canonical(buf: &mut Vec<u8>, entries: &[(Value, Value)]) {
    let mut pairs: Vec<(Vec<u8>, &Value)> = entries
        .iter()
        .map(|(k, v)| {
            let mut key_buf = Vec::new();
            encode_value_to(&mut key_buf, k);
            (key_buf, v)
        })
        .collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    encode_uint(buf, 5, pairs.len() as u64);
    for (key_bytes, value) in pairs {
        buf.extend_from_slice(&key_bytes);
        encode_value_to(buf, value);
    }
}
