//! Proptest generators for property-based testing.

use proptest::prelude::*;

use blockart_core::{BlockHash, Keypair, Op, OpId, PublicKey, ShapeSpec, ShapeType};

use crate::fixtures::{segment_svg, square_svg};

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

pub fn public_key() -> impl Strategy<Value = PublicKey> {
    keypair().prop_map(|kp| kp.public_key())
}

pub fn block_hash() -> impl Strategy<Value = BlockHash> {
    any::<[u8; 32]>().prop_map(BlockHash::from_bytes)
}

pub fn op_id() -> impl Strategy<Value = OpId> {
    any::<[u8; 32]>().prop_map(OpId::from_bytes)
}

/// A colour name, or transparent.
pub fn colour() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("transparent".to_string()),
        Just("black".to_string()),
        Just("red".to_string()),
        "#[0-9a-f]{6}",
    ]
}

/// A segment inside a 1024x1024 canvas.
pub fn segment() -> impl Strategy<Value = String> {
    (0u32..=1024, 0u32..=1024, 0u32..=1024, 0u32..=1024)
        .prop_filter("zero-length", |(x1, y1, x2, y2)| (x1, y1) != (x2, y2))
        .prop_map(|(x1, y1, x2, y2)| segment_svg(x1, y1, x2, y2))
}

/// A square of side 1..=50 inside a 1024x1024 canvas.
pub fn square() -> impl Strategy<Value = (u32, u32, u32)> {
    (0u32..=974, 0u32..=974, 1u32..=50)
}

/// Parameters for generating an add op.
#[derive(Debug, Clone)]
pub struct ShapeParams {
    pub keypair: Keypair,
    pub svg: String,
    pub fill: String,
    pub stroke: String,
    pub created_at: i64,
}

impl Arbitrary for ShapeParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        let svg = prop_oneof![
            segment(),
            square().prop_map(|(x, y, side)| square_svg(x, y, side)),
        ];
        (
            any::<[u8; 32]>(),
            svg,
            colour(),
            colour(),
            0i64..=1_700_000_000_000i64,
        )
            .prop_map(|(seed, svg, fill, stroke, created_at)| ShapeParams {
                keypair: Keypair::from_seed(&seed),
                svg,
                fill,
                stroke,
                created_at,
            })
            .boxed()
    }
}

impl ShapeParams {
    pub fn spec(&self) -> ShapeSpec {
        ShapeSpec {
            shape_type: ShapeType::Path,
            svg: self.svg.clone(),
            fill: self.fill.clone(),
            stroke: self.stroke.clone(),
            created_at: self.created_at,
        }
    }
}

/// Generate an add op from parameters.
pub fn op_from_params(params: &ShapeParams) -> Op {
    Op::add_path(
        &params.keypair,
        params.svg.clone(),
        params.fill.clone(),
        params.stroke.clone(),
        params.created_at,
    )
}
