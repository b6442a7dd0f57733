//! Lambda, closure and local slot maps used by Edit and Continue.
//!
//! A method containing lambdas records, for every closure frame it allocates and every
//! lambda it emits, the syntax offset of the declaring node. The debugger uses these maps
//! to match lambdas and closures of an edited method with the previous generation.
//!
//! Syntax offsets may be negative (they are relative to the method body start), so both
//! blobs store a baseline and write every offset as a non-negative distance from it.
//!
//! # Lambda map blob
//!
//! ```text
//! MethodOrdinal + 1            (uint)
//! -SyntaxOffsetBaseline        (uint)
//! ClosureCount                 (uint)
//! ClosureSyntaxOffset - base   (uint) x ClosureCount
//! { LambdaSyntaxOffset - base (uint), ClosureOrdinal - MIN_CLOSURE_ORDINAL (uint) } until end
//! ```
//!
//! # Local slot map blob
//!
//! ```text
//! [0xFF  -SyntaxOffsetBaseline (uint)]   only if the baseline is below -1
//! { 0 }                                   unused slot
//! { Kind + 1 | 0x80 if ordinal, SyntaxOffset - base (uint), [Ordinal (uint)] }
//! ```

use crate::{
    file::parser::Parser,
    utils::{write_compressed_uint, MAX_COMPRESSED_UINT},
    Error, Result,
};

/// Closure ordinal of lambdas that capture nothing.
pub const STATIC_CLOSURE_ORDINAL: i32 = -1;
/// Closure ordinal of lambdas that only capture `this`.
pub const THIS_ONLY_CLOSURE_ORDINAL: i32 = -2;
/// Smallest closure ordinal, subtracted when encoding.
pub const MIN_CLOSURE_ORDINAL: i32 = THIS_ONLY_CLOSURE_ORDINAL;

const SYNTAX_OFFSET_BASELINE_MARKER: u8 = 0xFF;
const HAS_ORDINAL_FLAG: u8 = 0x80;

/// The frame a lambda is emitted into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LambdaClosure {
    /// Captures nothing, emitted into the shared static container
    Static,
    /// Captures only `this`, emitted as an instance method of the containing type
    ThisOnly,
    /// Emitted into the closure with the given ordinal
    Closure(u32),
}

impl LambdaClosure {
    /// The signed ordinal written to the map.
    #[must_use]
    pub fn ordinal(self) -> i32 {
        match self {
            LambdaClosure::Static => STATIC_CLOSURE_ORDINAL,
            LambdaClosure::ThisOnly => THIS_ONLY_CLOSURE_ORDINAL,
            LambdaClosure::Closure(ordinal) => ordinal as i32,
        }
    }

    /// Inverse of [`LambdaClosure::ordinal`].
    #[must_use]
    pub fn from_ordinal(ordinal: i32) -> Option<Self> {
        match ordinal {
            STATIC_CLOSURE_ORDINAL => Some(LambdaClosure::Static),
            THIS_ONLY_CLOSURE_ORDINAL => Some(LambdaClosure::ThisOnly),
            n if n >= 0 => Some(LambdaClosure::Closure(n as u32)),
            _ => None,
        }
    }
}

/// A lambda entry of a [`LambdaMap`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LambdaInfo {
    /// Syntax offset of the lambda expression
    pub syntax_offset: i32,
    /// Ordinal of the generated lambda method
    pub lambda_ordinal: u32,
    /// Frame the lambda lives in
    pub closure: LambdaClosure,
}

/// The lambda and closure map of one method.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct LambdaMap {
    /// Ordinal of the method among overloads, -1 if it has none
    pub method_ordinal: i32,
    /// Closure syntax offsets, indexed by closure ordinal
    pub closures: Vec<i32>,
    /// Lambdas ordered by lambda ordinal
    pub lambdas: Vec<LambdaInfo>,
}

impl LambdaMap {
    /// Returns `true` if the method has neither closures nor lambdas.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.closures.is_empty() && self.lambdas.is_empty()
    }

    fn baseline(&self) -> i32 {
        self.closures
            .iter()
            .copied()
            .chain(self.lambdas.iter().map(|l| l.syntax_offset))
            .fold(-1, i32::min)
    }

    /// Encodes the `EncLambdaAndClosureMap` blob.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if an offset distance does not fit a compressed
    /// integer.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let baseline = self.baseline();
        let mut blob = Vec::with_capacity(8 + 2 * (self.closures.len() + self.lambdas.len()));

        write_uint_checked(i64::from(self.method_ordinal) + 1, &mut blob)?;
        write_uint_checked(-i64::from(baseline), &mut blob)?;
        write_uint_checked(self.closures.len() as i64, &mut blob)?;
        for closure in &self.closures {
            write_uint_checked(i64::from(*closure) - i64::from(baseline), &mut blob)?;
        }
        for lambda in &self.lambdas {
            write_uint_checked(i64::from(lambda.syntax_offset) - i64::from(baseline), &mut blob)?;
            write_uint_checked(
                i64::from(lambda.closure.ordinal()) - i64::from(MIN_CLOSURE_ORDINAL),
                &mut blob,
            )?;
        }
        Ok(blob)
    }

    /// Decodes an `EncLambdaAndClosureMap` blob.
    ///
    /// # Errors
    /// Returns an error for truncated data or out of range ordinals.
    pub fn decode(blob: &[u8]) -> Result<Self> {
        let mut parser = Parser::new(blob);
        let method_ordinal = i64::from(parser.read_compressed_uint()?) - 1;
        let baseline = -i64::from(parser.read_compressed_uint()?);
        let closure_count = parser.read_compressed_uint()?;

        let to_offset = |value: u32| -> Result<i32> {
            i32::try_from(i64::from(value) + baseline)
                .map_err(|_| malformed_error!("Syntax offset out of range in lambda map"))
        };

        let mut closures = Vec::new();
        for _ in 0..closure_count {
            closures.push(to_offset(parser.read_compressed_uint()?)?);
        }

        let mut lambdas = Vec::new();
        while parser.has_more_data() {
            let syntax_offset = to_offset(parser.read_compressed_uint()?)?;
            let raw_ordinal = i64::from(parser.read_compressed_uint()?) + i64::from(MIN_CLOSURE_ORDINAL);
            let closure = i32::try_from(raw_ordinal)
                .ok()
                .and_then(LambdaClosure::from_ordinal)
                .ok_or_else(|| malformed_error!("Invalid closure ordinal {}", raw_ordinal))?;
            if let LambdaClosure::Closure(ordinal) = closure {
                if ordinal >= closure_count {
                    return Err(Error::InvalidClosure {
                        syntax_offset,
                        ordinal,
                    });
                }
            }
            lambdas.push(LambdaInfo {
                syntax_offset,
                lambda_ordinal: lambdas.len() as u32,
                closure,
            });
        }

        Ok(LambdaMap {
            method_ordinal: i32::try_from(method_ordinal)
                .map_err(|_| malformed_error!("Method ordinal out of range"))?,
            closures,
            lambdas,
        })
    }
}

fn write_uint_checked(value: i64, blob: &mut Vec<u8>) -> Result<()> {
    match u32::try_from(value) {
        Ok(value) if value <= MAX_COMPRESSED_UINT => {
            write_compressed_uint(value, blob);
            Ok(())
        }
        _ => Err(malformed_error!(
            "Value {} cannot be written as a compressed integer",
            value
        )),
    }
}

/// Records closures and lambdas of one method in the order code generation meets them.
#[derive(Debug)]
pub struct LambdaMapBuilder {
    method_ordinal: i32,
    closures: Vec<i32>,
    lambdas: Vec<LambdaInfo>,
}

impl LambdaMapBuilder {
    /// Starts a map for the method with the given ordinal.
    #[must_use]
    pub fn new(method_ordinal: i32) -> Self {
        LambdaMapBuilder {
            method_ordinal,
            closures: Vec::new(),
            lambdas: Vec::new(),
        }
    }

    /// Records a closure frame and returns its ordinal. Recording the same syntax offset
    /// again returns the existing ordinal.
    pub fn record_closure(&mut self, syntax_offset: i32) -> u32 {
        if let Some(ordinal) = self.closures.iter().position(|&o| o == syntax_offset) {
            return ordinal as u32;
        }
        self.closures.push(syntax_offset);
        (self.closures.len() - 1) as u32
    }

    /// Records a lambda.
    ///
    /// # Errors
    /// Returns [`Error::InvalidClosure`] if `closure` names an ordinal that was never
    /// returned by [`LambdaMapBuilder::record_closure`].
    pub fn record_lambda(
        &mut self,
        syntax_offset: i32,
        lambda_ordinal: u32,
        closure: LambdaClosure,
    ) -> Result<()> {
        if let LambdaClosure::Closure(ordinal) = closure {
            if ordinal as usize >= self.closures.len() {
                return Err(Error::InvalidClosure {
                    syntax_offset,
                    ordinal,
                });
            }
        }
        self.lambdas.push(LambdaInfo {
            syntax_offset,
            lambda_ordinal,
            closure,
        });
        Ok(())
    }

    /// Finishes the map, ordering lambdas by ordinal.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if lambda ordinals are not `0..n`.
    pub fn build(mut self) -> Result<LambdaMap> {
        self.lambdas.sort_by_key(|l| l.lambda_ordinal);
        if let Some((index, lambda)) = self
            .lambdas
            .iter()
            .enumerate()
            .find(|(index, l)| l.lambda_ordinal as usize != *index)
        {
            return Err(malformed_error!(
                "Lambda ordinal {} at position {} - ordinals must be dense",
                lambda.lambda_ordinal,
                index
            ));
        }

        Ok(LambdaMap {
            method_ordinal: self.method_ordinal,
            closures: self.closures,
            lambdas: self.lambdas,
        })
    }
}

/// Kind of a long-lived local slot. `0` is a user defined local, other values identify
/// compiler synthesized locals.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SynthesizedLocalKind(pub u8);

impl SynthesizedLocalKind {
    /// Local declared in source
    pub const USER_DEFINED: SynthesizedLocalKind = SynthesizedLocalKind(0);
    /// Largest kind the slot map can store
    pub const MAX: SynthesizedLocalKind = SynthesizedLocalKind(0x7D);
}

/// Identity of one local slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LocalSlotInfo {
    /// Kind of local
    pub kind: SynthesizedLocalKind,
    /// Syntax offset of the declaring node
    pub syntax_offset: i32,
    /// Distinguishes locals of the same kind declared by the same node
    pub ordinal: u32,
}

/// Slot map of a method body, indexed by slot; `None` for slots that are not long-lived.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct LocalSlotMap {
    /// The slots
    pub slots: Vec<Option<LocalSlotInfo>>,
}

impl LocalSlotMap {
    /// Creates a map from slots.
    #[must_use]
    pub fn new(slots: Vec<Option<LocalSlotInfo>>) -> Self {
        LocalSlotMap { slots }
    }

    /// Returns `true` if there are no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Encodes the `EncLocalSlotMap` blob.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for a kind above [`SynthesizedLocalKind::MAX`]
    /// or offsets that do not fit a compressed integer.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let baseline = self
            .slots
            .iter()
            .flatten()
            .map(|slot| slot.syntax_offset)
            .fold(-1, i32::min);

        let mut blob = Vec::with_capacity(self.slots.len() * 2 + 4);
        if baseline != -1 {
            blob.push(SYNTAX_OFFSET_BASELINE_MARKER);
            write_uint_checked(-i64::from(baseline), &mut blob)?;
        }

        for slot in &self.slots {
            let Some(slot) = slot else {
                blob.push(0);
                continue;
            };
            if slot.kind.0 > SynthesizedLocalKind::MAX.0 {
                return Err(malformed_error!("Local kind {} cannot be encoded", slot.kind.0));
            }

            let mut header = slot.kind.0 + 1;
            if slot.ordinal > 0 {
                header |= HAS_ORDINAL_FLAG;
            }
            blob.push(header);
            write_uint_checked(i64::from(slot.syntax_offset) - i64::from(baseline), &mut blob)?;
            if slot.ordinal > 0 {
                write_uint_checked(i64::from(slot.ordinal), &mut blob)?;
            }
        }
        Ok(blob)
    }

    /// Decodes an `EncLocalSlotMap` blob.
    ///
    /// # Errors
    /// Returns an error for truncated data.
    pub fn decode(blob: &[u8]) -> Result<Self> {
        let mut parser = Parser::new(blob);
        let mut baseline = -1i64;
        if parser.has_more_data() && parser.peek_byte()? == SYNTAX_OFFSET_BASELINE_MARKER {
            parser.advance_by(1)?;
            baseline = -i64::from(parser.read_compressed_uint()?);
        }

        let mut slots = Vec::new();
        while parser.has_more_data() {
            let header = parser.read_le::<u8>()?;
            if header == 0 {
                slots.push(None);
                continue;
            }

            let kind = SynthesizedLocalKind((header & !HAS_ORDINAL_FLAG) - 1);
            let syntax_offset = i32::try_from(i64::from(parser.read_compressed_uint()?) + baseline)
                .map_err(|_| malformed_error!("Syntax offset out of range in slot map"))?;
            let ordinal = if header & HAS_ORDINAL_FLAG != 0 {
                parser.read_compressed_uint()?
            } else {
                0
            };
            slots.push(Some(LocalSlotInfo {
                kind,
                syntax_offset,
                ordinal,
            }));
        }
        Ok(LocalSlotMap { slots })
    }
}
