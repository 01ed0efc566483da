use std::collections::HashSet;

use crate::error::{VisError, VisResult};
use crate::schema::{Point, PointId, TweenChannel};

const FLOAT_BYTES: u64 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeRole {
    Start,
    End,
}

/// One shader-visible attribute inside the interleaved per-point record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeSlot {
    pub name: String,
    pub channel: usize,
    pub role: AttributeRole,
    pub components: usize,
    /// Byte offset inside one point's record.
    pub offset: u64,
}

/// Byte layout of the (start, end) record built for every point.
///
/// Channels keep their declaration order; each contributes its start values
/// followed by its end values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeLayout {
    channels: Vec<TweenChannel>,
    slots: Vec<AttributeSlot>,
    floats_per_point: usize,
}

impl AttributeLayout {
    pub fn new(channels: &[TweenChannel]) -> VisResult<Self> {
        if channels.is_empty() {
            return Err(VisError::config("at least one tween channel is required"));
        }

        let mut seen = HashSet::with_capacity(channels.len());
        let mut slots = Vec::with_capacity(channels.len() * 2);
        let mut offset = 0_u64;

        for (channel_index, channel) in channels.iter().enumerate() {
            if !is_identifier(&channel.key) {
                return Err(VisError::config(format!(
                    "tween channel key '{}' must be an identifier ([A-Za-z_][A-Za-z0-9_]*)",
                    channel.key
                )));
            }
            if !(1..=4).contains(&channel.length) {
                return Err(VisError::config(format!(
                    "tween channel '{}' has length {}, expected 1..=4",
                    channel.key, channel.length
                )));
            }
            if !seen.insert(channel.key.as_str()) {
                return Err(VisError::config(format!(
                    "duplicate tween channel '{}'",
                    channel.key
                )));
            }

            for (role, suffix) in [(AttributeRole::Start, "start"), (AttributeRole::End, "end")] {
                slots.push(AttributeSlot {
                    name: format!("{}_{suffix}", channel.key),
                    channel: channel_index,
                    role,
                    components: channel.length,
                    offset,
                });
                offset += FLOAT_BYTES * channel.length as u64;
            }
        }

        Ok(Self {
            channels: channels.to_vec(),
            slots,
            floats_per_point: (offset / FLOAT_BYTES) as usize,
        })
    }

    pub fn channels(&self) -> &[TweenChannel] {
        &self.channels
    }

    pub fn channel(&self, key: &str) -> Option<&TweenChannel> {
        self.channels.iter().find(|channel| channel.key == key)
    }

    pub fn slots(&self) -> &[AttributeSlot] {
        &self.slots
    }

    pub fn floats_per_point(&self) -> usize {
        self.floats_per_point
    }

    /// Bytes between consecutive point records.
    pub fn stride(&self) -> u64 {
        self.floats_per_point as u64 * FLOAT_BYTES
    }

    /// Builds the interleaved (source, dest) record for every point in `dest`.
    ///
    /// Points `source` cannot resolve start from their own values and do not
    /// move. A source that lacks a channel also falls back to the dest value.
    pub fn pack<'a, S>(&self, dest: &[Point], source: S) -> VisResult<Vec<f32>>
    where
        S: Fn(&PointId) -> Option<&'a Point>,
    {
        let mut packed = Vec::with_capacity(dest.len() * self.floats_per_point);

        for point in dest {
            let from = source(&point.id);
            for channel in &self.channels {
                let end = channel_values(point, channel)?;
                let start = from
                    .and_then(|previous| channel_values(previous, channel).ok())
                    .unwrap_or(end);
                packed.extend_from_slice(start);
                packed.extend_from_slice(end);
            }
        }

        Ok(packed)
    }
}

fn channel_values<'p>(point: &'p Point, channel: &TweenChannel) -> VisResult<&'p [f32]> {
    let values = point.channel(&channel.key).ok_or_else(|| {
        VisError::config(format!(
            "point {} has no value for tween channel '{}'",
            point.id, channel.key
        ))
    })?;

    if values.len() != channel.length {
        return Err(VisError::config(format!(
            "point {} channel '{}' has {} component(s), expected {}",
            point.id,
            channel.key,
            values.len(),
            channel.length
        )));
    }

    Ok(values)
}

fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
