//! Built-in format plugins.
//!
//! The engine ships one exemplar pair: the H.264/AVC Access Unit splitter
//! and the NAL unit decoder it depends on. They exercise the whole plugin
//! surface (length-prefixed framing, length-scoped dispatch, dependencies,
//! symbolic values) and double as the reference for writing new formats.

// ISO/IEC 14496-15, 5.3.3.1.2 Syntax

use crate::decoder::Decoder;
use crate::error::Result;
use crate::registry::{Format, Registry};
use crate::value::Value;

/// Registers all built-in formats. Call before sealing the registry.
pub fn register_all(registry: &mut Registry) -> Result<()> {
    registry.register(
        Format::new("avc_au", "H.264/AVC Access Unit", avc_au_decode)
            .root_array("access_unit")
            .dependency(&["avc_nalu"]),
    )?;
    registry.register(Format::new(
        "avc_nalu",
        "H.264/AVC Network Access Layer Unit",
        avc_nalu_decode,
    ))?;
    Ok(())
}

/// Splits an access unit into length-prefixed NAL units. `in_arg` must carry
/// `length_size`, the byte width of the length prefix (from the sample
/// entry's `lengthSizeMinusOne + 1`).
fn avc_au_decode(d: &mut Decoder<'_>, in_arg: &Value) -> Result<()> {
    let length_size = in_arg
        .get("length_size")
        .and_then(Value::as_u64)
        .ok_or_else(|| d.fatal("length_size required"))?;
    if length_size == 0 || length_size > 8 {
        return Err(d.errorf(format_args!("invalid length_size {}", length_size)));
    }
    let nalu_formats = d.format_group("avc_nalu")?;

    while d.not_end() {
        d.field_struct("nalu", |d| {
            let l = d.field_u("length", (length_size * 8) as u32)?;
            d.field_format_len("nalu", l.saturating_mul(8), &nalu_formats, None)?;
            Ok(())
        })?;
    }

    Ok(())
}

// ISO/IEC 14496-10, Table 7-1
fn nal_unit_type_sym(v: u64) -> Option<&'static str> {
    Some(match v {
        1 => "slice_non_idr",
        2 => "slice_data_partition_a",
        3 => "slice_data_partition_b",
        4 => "slice_data_partition_c",
        5 => "slice_idr",
        6 => "sei",
        7 => "sps",
        8 => "pps",
        9 => "access_unit_delimiter",
        10 => "end_of_sequence",
        11 => "end_of_stream",
        12 => "filler_data",
        13 => "sps_extension",
        14 => "prefix_nal_unit",
        15 => "subset_sps",
        19 => "auxiliary_slice",
        20 => "slice_extension",
        _ => return None,
    })
}

fn avc_nalu_decode(d: &mut Decoder<'_>, _in_arg: &Value) -> Result<()> {
    d.field_bool("forbidden_zero_bit")?;
    d.field_u("nal_ref_idc", 2)?;
    d.field_u_sym("nal_unit_type", 5, nal_unit_type_sym)?;
    let left = d.bits_left();
    if left > 0 {
        d.field_raw_len("data", left)?;
    }
    Ok(())
}
