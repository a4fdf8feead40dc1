//! Helper functionality for working with legacy tag serialization.

use super::{param_from_raw, param_to_raw, RawValue};
use crate::{km_err, try_to_vec, vec_try, vec_try_with_capacity, Error, FallibleAllocExt};
use alloc::vec::Vec;
use core::convert::{TryFrom, TryInto};
use tkm_wire::keymint::{tag_type, ErrorCode, KeyParam, Tag, TagType};

/// Retrieve a `u8` from the start of the given slice, if possible.
pub(crate) fn consume_u8(data: &mut &[u8]) -> Result<u8, Error> {
    match data.first() {
        Some(b) => {
            *data = &(*data)[1..];
            Ok(*b)
        }
        None => Err(km_err!(InvalidKeyBlob, "failed to find 1 byte")),
    }
}

/// Move past a bool value from the start of the given slice, if possible.
/// Bool values should only be included if `true`, so fail if the value
/// is anything other than 1.
pub(crate) fn consume_bool(data: &mut &[u8]) -> Result<(), Error> {
    let b = consume_u8(data)?;
    if b == 0x01 {
        Ok(())
    } else {
        Err(km_err!(InvalidKeyBlob, "bool value other than 1 encountered"))
    }
}

/// Retrieve a (host-ordered) `u32` from the start of the given slice, if possible.
pub(crate) fn consume_u32(data: &mut &[u8]) -> Result<u32, Error> {
    if data.len() < 4 {
        return Err(km_err!(InvalidKeyBlob, "failed to find 4 bytes"));
    }
    let chunk: [u8; 4] = data[..4].try_into().unwrap(); // safe: just checked
    *data = &(*data)[4..];
    Ok(u32::from_ne_bytes(chunk))
}

/// Retrieve a (host-ordered) `u64` from the start of the given slice, if possible.
pub(crate) fn consume_u64(data: &mut &[u8]) -> Result<u64, Error> {
    if data.len() < 8 {
        return Err(km_err!(InvalidKeyBlob, "failed to find 8 bytes"));
    }
    let chunk: [u8; 8] = data[..8].try_into().unwrap(); // safe: just checked
    *data = &(*data)[8..];
    Ok(u64::from_ne_bytes(chunk))
}

/// Retrieve a vector of bytes from the start of the given slice, if possible,
/// with the length of the data is expected to appear as a host-ordered `u32` prefix.
pub(crate) fn consume_vec(data: &mut &[u8]) -> Result<Vec<u8>, Error> {
    let len = consume_u32(data)? as usize;
    if len > data.len() {
        return Err(km_err!(InvalidKeyBlob, "failed to find {} bytes", len));
    }
    let result = try_to_vec(&data[..len])?;
    *data = &(*data)[len..];
    Ok(result)
}

/// Append a host-ordered `u32` length followed by the data itself.
pub(crate) fn append_vec(dest: &mut Vec<u8>, data: &[u8]) -> Result<(), Error> {
    dest.try_extend_from_slice(&(data.len() as u32).to_ne_bytes())?;
    dest.try_extend_from_slice(data)
}

/// Serialize a collection of [`KeyParam`]s into the legacy authorization set format:
///
/// ```text
/// [0..4]              Size B of `TagType::Bytes` data, in host order.
/// [4..4+B]      (*)   Concatenated contents of each `TagType::Bytes` tag.
/// [4+B..4+B+4]        Count N of the number of parameters, in host order.
/// [8+B..8+B+4]        Size Z of encoded parameters.
/// [12+B..12+B+Z]      Serialized parameters one after another.
/// ```
///
/// Individual parameters are serialized in the last chunk as:
///
/// ```text
/// [0..4]              Tag number, in host order.
/// Followed by one of the following depending on the tag's `TagType`; all integers in host order:
///   [4..5]            Bool value (`TagType::Bool`)
///   [4..8]            u32 values (`TagType::Uint[Rep]`, `TagType::Enum[Rep]`)
///   [4..12]           u64 values (`TagType::Ulong[Rep]`, `TagType::Date`)
///   [4..8] + [8..12]  Size + offset of data in (*) above (`TagType::Bytes`, `TagType::Bignum`)
/// ```
pub fn serialize(params: &[KeyParam]) -> Result<Vec<u8>, Error> {
    // First 4 bytes are the length of the combined [`TagType::Bytes`] data; come back to set that
    // in a moment.
    let mut result = vec_try![0; 4]?;

    // Next append the contents of all of the [`TagType::Bytes`] data.
    let mut blob_size = 0u32;
    for param in params {
        if let RawValue::Bytes(v) = param_to_raw(param) {
            result.try_extend_from_slice(v)?;
            blob_size += v.len() as u32;
        }
    }
    // Go back and fill in the combined blob length in native order at the start.
    result[..4].clone_from_slice(&blob_size.to_ne_bytes());

    result.try_extend_from_slice(&(params.len() as u32).to_ne_bytes())?;

    let params_size_offset = result.len();
    result.try_extend_from_slice(&[0u8; 4])?; // placeholder for size of elements
    let first_param_offset = result.len();
    let mut blob_offset = 0u32;
    for param in params {
        result.try_extend_from_slice(&(param.tag() as u32).to_ne_bytes())?;
        match param_to_raw(param) {
            RawValue::True => result.try_push(0x01u8)?,
            RawValue::Integer(v) => result.try_extend_from_slice(&v.to_ne_bytes())?,
            RawValue::Long(v) => result.try_extend_from_slice(&v.to_ne_bytes())?,
            RawValue::Bytes(v) => {
                let blob_len = v.len() as u32;
                result.try_extend_from_slice(&blob_len.to_ne_bytes())?;
                result.try_extend_from_slice(&blob_offset.to_ne_bytes())?;
                blob_offset += blob_len;
            }
        }
    }
    let serialized_size = (result.len() - first_param_offset) as u32;

    // Go back and fill in the total serialized size.
    result[params_size_offset..params_size_offset + 4]
        .clone_from_slice(&serialized_size.to_ne_bytes());
    Ok(result)
}

/// Retrieve the contents of a tag of `TagType::Bytes`.  The `data` parameter holds
/// the as-yet unparsed data, and a length and offset are read from this (and consumed).
/// This length and offset refer to a location in the combined `blob_data`; however,
/// the offset is expected to be the next unconsumed chunk of `blob_data`, as indicated
/// by `next_blob_offset` (which itself is updated as a result of consuming the data).
fn consume_blob<'a>(
    data: &mut &[u8],
    next_blob_offset: &mut usize,
    blob_data: &'a [u8],
) -> Result<&'a [u8], Error> {
    let data_len = consume_u32(data)? as usize;
    let data_offset = consume_u32(data)? as usize;
    // Expect the blob data to come from the next offset in the initial blob chunk.
    if data_offset != *next_blob_offset {
        return Err(km_err!(
            InvalidKeyBlob,
            "got blob offset {} instead of {}",
            data_offset,
            next_blob_offset
        ));
    }
    if data_len > blob_data.len() - data_offset {
        return Err(km_err!(
            InvalidKeyBlob,
            "blob at offset [{}..{}+{}] goes beyond blob data size {}",
            data_offset,
            data_offset,
            data_len,
            blob_data.len(),
        ));
    }

    *next_blob_offset += data_len;
    Ok(&blob_data[data_offset..data_offset + data_len])
}

/// Deserialize a collection of [`KeyParam`]s in legacy serialized format. The provided slice is
/// modified to contain the unconsumed part of the data.
pub fn deserialize(data: &mut &[u8]) -> Result<Vec<KeyParam>, Error> {
    let blob_data_size = consume_u32(data)? as usize;
    if blob_data_size > data.len() {
        return Err(km_err!(
            InvalidKeyBlob,
            "blob data size {} beyond remaining {}",
            blob_data_size,
            data.len()
        ));
    }

    let blob_data = &data[..blob_data_size];
    let mut next_blob_offset = 0;

    // Move past the blob data.
    *data = &data[blob_data_size..];

    let param_count = consume_u32(data)? as usize;
    let param_size = consume_u32(data)? as usize;
    if param_size > data.len() {
        return Err(km_err!(
            InvalidKeyBlob,
            "size mismatch 4+{}+4+4+{} > {}",
            blob_data_size,
            param_size,
            data.len()
        ));
    }
    // Every parameter takes at least 5 bytes, so a count beyond that is bogus; check before
    // reserving space.
    if param_count > param_size / 5 {
        return Err(km_err!(
            InvalidKeyBlob,
            "{} params cannot fit in {} bytes",
            param_count,
            param_size
        ));
    }

    let (mut params_data, rest) = data.split_at(param_size);
    let mut results = vec_try_with_capacity!(param_count)?;
    for _i in 0..param_count {
        let data = &mut params_data;
        let tag_num = consume_u32(data)? as i32;
        let tag = <Tag>::try_from(tag_num)
            .map_err(|_e| km_err!(InvalidKeyBlob, "unknown tag {} encountered", tag_num))?;
        let value = match tag_type(tag) {
            TagType::Bool => {
                consume_bool(data)?;
                RawValue::True
            }
            TagType::Enum | TagType::EnumRep | TagType::Uint | TagType::UintRep => {
                RawValue::Integer(consume_u32(data)?)
            }
            TagType::Ulong | TagType::UlongRep | TagType::Date => {
                RawValue::Long(consume_u64(data)?)
            }
            TagType::Bytes | TagType::Bignum => {
                RawValue::Bytes(consume_blob(data, &mut next_blob_offset, blob_data)?)
            }
            TagType::Invalid => {
                return Err(km_err!(InvalidKeyBlob, "invalid tag {:?} encountered", tag));
            }
        };
        results.try_push(param_from_raw(tag, value, ErrorCode::InvalidKeyBlob)?)?;
    }
    if !params_data.is_empty() {
        return Err(km_err!(
            InvalidKeyBlob,
            "{} bytes left over after {} params",
            params_data.len(),
            param_count
        ));
    }
    *data = rest;

    Ok(results)
}
