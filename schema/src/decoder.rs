//! Field value decoders.
//!
//! A [`FieldDecoder`] is picked once per field when the serializer registry
//! is built, from the field's var type and its encoding properties. Decoding
//! then only dispatches on a small `Copy` enum.

use bitstream::BitReader;

use crate::error::{SchemaError, SchemaResult};
use crate::value::FieldValue;
use crate::var_type::VarType;

/// Upper bound on decoded string length.
pub const MAX_STRING_BYTES: usize = 4096;

const QFE_ROUND_DOWN: u32 = 1 << 0;
const QFE_ROUND_UP: u32 = 1 << 1;
const QFE_ENCODE_ZERO: u32 = 1 << 2;
const QFE_ENCODE_INTEGERS: u32 = 1 << 3;

const FALLBACK_MULTIPLIERS: [f32; 5] = [0.9999, 0.99, 0.9, 0.8, 0.7];

/// Simulation time is sent in ticks.
const SIMULATION_TICKS_PER_SECOND: f32 = 30.0;

/// Encoding properties carried by a serializer field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldProps {
    pub bit_count: Option<i32>,
    pub low_value: Option<f32>,
    pub high_value: Option<f32>,
    pub encode_flags: Option<i32>,
    pub encoder: Option<String>,
}

impl FieldProps {
    fn encoder(&self) -> Option<&str> {
        self.encoder.as_deref()
    }

    /// Bit count usable for scaled encodings, if any.
    fn scaled_bits(&self) -> Option<u8> {
        self.bit_count
            .filter(|bits| (1..32).contains(bits))
            .and_then(|bits| u8::try_from(bits).ok())
    }
}

/// A range-quantized float.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantizedFloat {
    bit_count: u8,
    flags: u32,
    low: f32,
    high: f32,
    high_low_mul: f32,
    dec_mul: f32,
}

impl QuantizedFloat {
    /// Sets up the quantizer from a field's properties.
    ///
    /// `bit_count` must be in `1..32`; wider or absent counts are sent
    /// unscaled and never reach here.
    #[allow(clippy::float_cmp)]
    pub fn new(bit_count: u8, flags: u32, low: f32, high: f32) -> SchemaResult<Self> {
        if bit_count == 0 || bit_count >= 32 {
            return Err(SchemaError::InvalidQuantizedFloat {
                reason: "bit count out of range",
            });
        }
        let mut q = Self {
            bit_count,
            flags: validate_flags(flags, low, high)?,
            low,
            high,
            high_low_mul: 0.0,
            dec_mul: 0.0,
        };

        let mut steps = 1u64 << q.bit_count;
        if q.flags & QFE_ROUND_DOWN != 0 {
            let offset = (q.high - q.low) / steps as f32;
            q.high -= offset;
        } else if q.flags & QFE_ROUND_UP != 0 {
            let offset = (q.high - q.low) / steps as f32;
            q.low += offset;
        }

        if q.flags & QFE_ENCODE_INTEGERS != 0 {
            let delta = (q.high - q.low).max(1.0);
            let range = 1u64 << (f64::from(delta).log2().ceil() as u32).min(62);
            let mut bits = q.bit_count;
            while (1u64 << bits) <= range {
                bits += 1;
            }
            if bits > 31 {
                return Err(SchemaError::InvalidQuantizedFloat {
                    reason: "integer range too wide",
                });
            }
            if bits > q.bit_count {
                q.bit_count = bits;
                steps = 1u64 << bits;
            }
            let offset = range as f32 / steps as f32;
            q.high = q.low + range as f32 - offset;
        }

        q.assign_multipliers(steps)?;

        // Drop flags whose special value the plain encoding already hits.
        if q.flags & QFE_ROUND_DOWN != 0 && q.quantize(q.low) == q.low {
            q.flags &= !QFE_ROUND_DOWN;
        }
        if q.flags & QFE_ROUND_UP != 0 && q.quantize(q.high) == q.high {
            q.flags &= !QFE_ROUND_UP;
        }
        if q.flags & QFE_ENCODE_ZERO != 0 && q.quantize(0.0) == 0.0 {
            q.flags &= !QFE_ENCODE_ZERO;
        }
        Ok(q)
    }

    fn assign_multipliers(&mut self, steps: u64) -> SchemaResult<()> {
        let range = self.high - self.low;
        let high = ((1u64 << self.bit_count) - 1) as f32;
        let overflows = |mul: f32| mul * range > high || f64::from(mul * range) > f64::from(high);

        let mut mul = if range.abs() <= 0.0 { high } else { high / range };
        if overflows(mul) {
            for factor in FALLBACK_MULTIPLIERS {
                mul = high / range * factor;
                if !overflows(mul) {
                    break;
                }
            }
        }
        if mul == 0.0 || !mul.is_finite() {
            return Err(SchemaError::InvalidQuantizedFloat {
                reason: "degenerate range multiplier",
            });
        }
        self.high_low_mul = mul;
        self.dec_mul = 1.0 / (steps - 1) as f32;
        Ok(())
    }

    fn quantize(&self, value: f32) -> f32 {
        if value < self.low {
            return self.low;
        }
        if value > self.high {
            return self.high;
        }
        let step = ((value - self.low) * self.high_low_mul) as u32;
        self.low + (self.high - self.low) * (step as f32 * self.dec_mul)
    }

    #[must_use]
    pub const fn bit_count(&self) -> u8 {
        self.bit_count
    }

    #[must_use]
    pub const fn low(&self) -> f32 {
        self.low
    }

    #[must_use]
    pub const fn high(&self) -> f32 {
        self.high
    }

    pub fn decode(&self, reader: &mut BitReader<'_>) -> SchemaResult<f32> {
        if self.flags & QFE_ROUND_DOWN != 0 && reader.read_bit()? {
            return Ok(self.low);
        }
        if self.flags & QFE_ROUND_UP != 0 && reader.read_bit()? {
            return Ok(self.high);
        }
        if self.flags & QFE_ENCODE_ZERO != 0 && reader.read_bit()? {
            return Ok(0.0);
        }
        let step = reader.read_bits(self.bit_count)?;
        Ok(self.low + (self.high - self.low) * step as f32 * self.dec_mul)
    }
}

#[allow(clippy::float_cmp)]
fn validate_flags(mut flags: u32, low: f32, high: f32) -> SchemaResult<u32> {
    if flags == 0 {
        return Ok(0);
    }
    if (low == 0.0 && flags & QFE_ROUND_DOWN != 0) || (high == 0.0 && flags & QFE_ROUND_UP != 0) {
        flags &= !QFE_ENCODE_ZERO;
    }
    if low == 0.0 && flags & QFE_ENCODE_ZERO != 0 {
        flags |= QFE_ROUND_DOWN;
        flags &= !QFE_ENCODE_ZERO;
    }
    if high == 0.0 && flags & QFE_ENCODE_ZERO != 0 {
        flags |= QFE_ROUND_UP;
        flags &= !QFE_ENCODE_ZERO;
    }
    if low > 0.0 || high < 0.0 {
        flags &= !QFE_ENCODE_ZERO;
    }
    if flags & QFE_ENCODE_INTEGERS != 0 {
        flags &= !(QFE_ROUND_UP | QFE_ROUND_DOWN | QFE_ENCODE_ZERO);
    }
    if flags & (QFE_ROUND_DOWN | QFE_ROUND_UP) == QFE_ROUND_DOWN | QFE_ROUND_UP {
        return Err(SchemaError::InvalidQuantizedFloat {
            reason: "round up and round down are exclusive",
        });
    }
    Ok(flags)
}

/// Scalar float encodings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FloatDecoder {
    NoScale,
    Coord,
    SimulationTime,
    RuneTime,
    Normal,
    Quantized(QuantizedFloat),
}

impl FloatDecoder {
    /// Picks the float encoding for a plain float field.
    pub fn for_props(props: &FieldProps) -> SchemaResult<Self> {
        match props.encoder() {
            Some("coord") => return Ok(Self::Coord),
            Some("simtime") => return Ok(Self::SimulationTime),
            Some("runetime") => return Ok(Self::RuneTime),
            Some("normal") => return Ok(Self::Normal),
            _ => {}
        }
        Self::quantized(props)
    }

    /// Quantized when the field carries a usable bit count, unscaled otherwise.
    pub fn quantized(props: &FieldProps) -> SchemaResult<Self> {
        let Some(bits) = props.scaled_bits() else {
            return Ok(Self::NoScale);
        };
        let flags = props.encode_flags.map_or(0, |f| f as u32);
        let q = QuantizedFloat::new(
            bits,
            flags,
            props.low_value.unwrap_or(0.0),
            props.high_value.unwrap_or(1.0),
        )?;
        Ok(Self::Quantized(q))
    }

    pub fn decode(&self, reader: &mut BitReader<'_>) -> SchemaResult<f32> {
        Ok(match self {
            Self::NoScale => reader.read_f32()?,
            Self::Coord => reader.read_bit_coord()?,
            Self::SimulationTime => reader.read_varu32()? as f32 / SIMULATION_TICKS_PER_SECOND,
            Self::RuneTime => f32::from_bits(reader.read_bits(4)?),
            Self::Normal => reader.read_bit_normal()?,
            Self::Quantized(q) => q.decode(reader)?,
        })
    }
}

/// Decoder for one field value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldDecoder {
    Bool,
    Unsigned32,
    Unsigned64,
    Fixed64,
    Signed32,
    Signed64,
    Float(FloatDecoder),
    Vector { len: u8, component: FloatDecoder },
    VectorNormal,
    QAnglePitchYaw(u8),
    QAngleFixed(u8),
    QAnglePrecise,
    String,
    Component,
}

impl FieldDecoder {
    /// Picks the decoder for a value of the given var type.
    ///
    /// Unrecognized types are sent as unsigned varints.
    pub fn for_type(var_type: &VarType, props: &FieldProps) -> SchemaResult<Self> {
        Ok(match var_type.base.as_str() {
            "bool" => Self::Bool,
            "char" | "CUtlString" | "CUtlSymbolLarge" => Self::String,
            "int8" | "int16" | "int32" => Self::Signed32,
            "int64" => Self::Signed64,
            "uint64" | "CStrongHandle" => {
                if props.encoder() == Some("fixed64") {
                    Self::Fixed64
                } else {
                    Self::Unsigned64
                }
            }
            "float32" | "float" | "GameTime_t" => Self::Float(FloatDecoder::for_props(props)?),
            "CNetworkedQuantizedFloat" => Self::Float(FloatDecoder::quantized(props)?),
            "Vector" | "VectorWS" => {
                if props.encoder() == Some("normal") {
                    Self::VectorNormal
                } else {
                    Self::vector(3, props)?
                }
            }
            "Vector2D" => Self::vector(2, props)?,
            "Vector4D" | "Quaternion" => Self::vector(4, props)?,
            "QAngle" => Self::qangle(props),
            "CBodyComponent" | "CPhysicsComponent" | "CRenderComponent" => Self::Component,
            _ => Self::Unsigned32,
        })
    }

    fn vector(len: u8, props: &FieldProps) -> SchemaResult<Self> {
        Ok(Self::Vector {
            len,
            component: FloatDecoder::for_props(props)?,
        })
    }

    fn qangle(props: &FieldProps) -> Self {
        if props.encoder() == Some("qangle_pitch_yaw") {
            let bits = props
                .bit_count
                .and_then(|b| u8::try_from(b).ok())
                .filter(|b| (1..=32).contains(b))
                .unwrap_or(32);
            return Self::QAnglePitchYaw(bits);
        }
        match props.scaled_bits() {
            Some(bits) => Self::QAngleFixed(bits),
            None => Self::QAnglePrecise,
        }
    }

    /// Reads one value.
    pub fn decode(&self, reader: &mut BitReader<'_>) -> SchemaResult<FieldValue> {
        Ok(match *self {
            Self::Bool => FieldValue::Bool(reader.read_bit()?),
            Self::Unsigned32 => FieldValue::Unsigned(u64::from(reader.read_varu32()?)),
            Self::Unsigned64 => FieldValue::Unsigned(reader.read_varu64()?),
            Self::Fixed64 => FieldValue::Unsigned(reader.read_u64_bits()?),
            Self::Signed32 => FieldValue::Signed(i64::from(reader.read_vars32()?)),
            Self::Signed64 => FieldValue::Signed(reader.read_vars64()?),
            Self::Float(f) => FieldValue::Float(f.decode(reader)?),
            Self::Vector { len, component } => match len {
                2 => FieldValue::Vector2([component.decode(reader)?, component.decode(reader)?]),
                3 => FieldValue::Vector3([
                    component.decode(reader)?,
                    component.decode(reader)?,
                    component.decode(reader)?,
                ]),
                _ => FieldValue::Vector4([
                    component.decode(reader)?,
                    component.decode(reader)?,
                    component.decode(reader)?,
                    component.decode(reader)?,
                ]),
            },
            Self::VectorNormal => FieldValue::Vector3(reader.read_bit_normal_vec3()?),
            Self::QAnglePitchYaw(bits) => FieldValue::Vector3([
                reader.read_bit_angle(bits)?,
                reader.read_bit_angle(bits)?,
                0.0,
            ]),
            Self::QAngleFixed(bits) => FieldValue::Vector3([
                reader.read_bit_angle(bits)?,
                reader.read_bit_angle(bits)?,
                reader.read_bit_angle(bits)?,
            ]),
            Self::QAnglePrecise => {
                let present = [reader.read_bit()?, reader.read_bit()?, reader.read_bit()?];
                let mut angles = [0.0f32; 3];
                for (angle, present) in angles.iter_mut().zip(present) {
                    if present {
                        *angle = reader.read_bit_coord()?;
                    }
                }
                FieldValue::Vector3(angles)
            }
            Self::String => FieldValue::String(reader.read_cstring(MAX_STRING_BYTES)?),
            Self::Component => FieldValue::Bool(reader.read_bit()?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitstream::BitWriter;

    fn props(bits: i32, low: f32, high: f32, flags: i32) -> FieldProps {
        FieldProps {
            bit_count: Some(bits),
            low_value: Some(low),
            high_value: Some(high),
            encode_flags: Some(flags),
            encoder: None,
        }
    }

    fn decoder(var_type: &str, props: &FieldProps) -> FieldDecoder {
        FieldDecoder::for_type(&VarType::parse(var_type).unwrap(), props).unwrap()
    }

    #[test]
    fn picks_integer_decoders() {
        let none = FieldProps::default();
        assert_eq!(decoder("int32", &none), FieldDecoder::Signed32);
        assert_eq!(decoder("int64", &none), FieldDecoder::Signed64);
        assert_eq!(decoder("uint8", &none), FieldDecoder::Unsigned32);
        assert_eq!(decoder("CHandle< CBaseEntity >", &none), FieldDecoder::Unsigned32);
        assert_eq!(decoder("uint64", &none), FieldDecoder::Unsigned64);
        let fixed = FieldProps {
            encoder: Some("fixed64".into()),
            ..FieldProps::default()
        };
        assert_eq!(decoder("uint64", &fixed), FieldDecoder::Fixed64);
    }

    #[test]
    fn picks_float_decoders() {
        assert_eq!(
            decoder("float32", &FieldProps::default()),
            FieldDecoder::Float(FloatDecoder::NoScale)
        );
        assert_eq!(
            decoder("float32", &props(32, 0.0, 1.0, 0)),
            FieldDecoder::Float(FloatDecoder::NoScale)
        );
        let coord = FieldProps {
            encoder: Some("coord".into()),
            ..FieldProps::default()
        };
        assert_eq!(decoder("float32", &coord), FieldDecoder::Float(FloatDecoder::Coord));
        assert!(matches!(
            decoder("float32", &props(8, 0.0, 1.0, 0)),
            FieldDecoder::Float(FloatDecoder::Quantized(_))
        ));
    }

    #[test]
    fn picks_angle_decoders() {
        assert_eq!(decoder("QAngle", &FieldProps::default()), FieldDecoder::QAnglePrecise);
        assert_eq!(
            decoder("QAngle", &props(10, 0.0, 0.0, 0)),
            FieldDecoder::QAngleFixed(10)
        );
        let pitch_yaw = FieldProps {
            bit_count: Some(12),
            encoder: Some("qangle_pitch_yaw".into()),
            ..FieldProps::default()
        };
        assert_eq!(decoder("QAngle", &pitch_yaw), FieldDecoder::QAnglePitchYaw(12));
    }

    #[test]
    fn quantized_plain_range() {
        let q = QuantizedFloat::new(8, 0, 0.0, 255.0).unwrap();
        let mut w = BitWriter::new();
        w.write_bits(255, 8).unwrap();
        w.write_bits(0, 8).unwrap();
        let bytes = w.finish();
        let mut r = BitReader::new(&bytes);
        assert!((q.decode(&mut r).unwrap() - 255.0).abs() < 1e-3);
        assert_eq!(q.decode(&mut r).unwrap(), 0.0);
    }

    #[test]
    fn quantized_round_down_shrinks_high() {
        // low is exactly representable, so no flag bit precedes the value.
        let q = QuantizedFloat::new(4, QFE_ROUND_DOWN, 1.0, 2.0).unwrap();
        assert!((q.high() - 1.9375).abs() < 1e-6);
        let mut w = BitWriter::new();
        w.write_bits(15, 4).unwrap();
        let bytes = w.finish();
        let mut r = BitReader::new(&bytes);
        assert!((q.decode(&mut r).unwrap() - q.high()).abs() < 1e-5);
        assert_eq!(r.bit_position(), 4);
    }

    #[test]
    fn quantized_encode_integers_widens_bits() {
        let q = QuantizedFloat::new(2, QFE_ENCODE_INTEGERS, 0.0, 100.0).unwrap();
        assert_eq!(q.bit_count(), 8);
    }

    #[test]
    fn quantized_rejects_both_rounding_flags() {
        let err = QuantizedFloat::new(8, QFE_ROUND_DOWN | QFE_ROUND_UP, -1.0, 1.0).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidQuantizedFloat { .. }));
    }

    #[test]
    fn precise_qangle_skips_absent_components() {
        let mut w = BitWriter::new();
        w.write_bit(false);
        w.write_bit(false);
        w.write_bit(false);
        let bytes = w.finish();
        let mut r = BitReader::new(&bytes);
        assert_eq!(
            FieldDecoder::QAnglePrecise.decode(&mut r).unwrap(),
            FieldValue::Vector3([0.0; 3])
        );
        assert_eq!(r.bit_position(), 3);
    }

    #[test]
    fn string_and_varints() {
        let mut w = BitWriter::new();
        w.write_cstring("hero");
        w.write_varu32(300);
        w.write_vars32(-5);
        let bytes = w.finish();
        let mut r = BitReader::new(&bytes);
        assert_eq!(
            FieldDecoder::String.decode(&mut r).unwrap(),
            FieldValue::String("hero".into())
        );
        assert_eq!(
            FieldDecoder::Unsigned32.decode(&mut r).unwrap(),
            FieldValue::Unsigned(300)
        );
        assert_eq!(
            FieldDecoder::Signed32.decode(&mut r).unwrap(),
            FieldValue::Signed(-5)
        );
    }
}
