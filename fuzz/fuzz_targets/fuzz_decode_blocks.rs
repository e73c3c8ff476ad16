#![no_main]
use libfuzzer_sys::arbitrary::{self, Arbitrary};
use libfuzzer_sys::fuzz_target;
use tictune_core::protocol::{ProductVariant, decode_settings, decode_variables, settings_diff};

#[derive(Debug, Arbitrary)]
struct Input {
    product_id: u16,
    variables: Vec<u8>,
    settings: Vec<u8>,
}

const VARIANTS: [ProductVariant; 6] = [
    ProductVariant::T825,
    ProductVariant::T834,
    ProductVariant::T500,
    ProductVariant::N825,
    ProductVariant::T249,
    ProductVariant::Tic36v4,
];

fuzz_target!(|input: Input| {
    let variant = ProductVariant::from_product_id(input.product_id)
        .unwrap_or(VARIANTS[usize::from(input.product_id) % VARIANTS.len()]);
    let layout = variant.layout();
    // Short blocks must come back as Truncated, never panic.
    let _ = decode_variables(&layout, &input.variables);
    if let Ok(settings) = decode_settings(&layout, &input.settings) {
        // Out-of-range device values may refuse to encode; when they do encode,
        // a block never differs from itself.
        if let Ok(diff) = settings_diff(&layout, &settings, &settings) {
            assert!(diff.is_empty());
        }
    }
});
