//! Descriptors of compiler generated state machines.
//!
//! Iterator and async methods are rewritten into a kickoff method, which allocates the
//! state machine and starts it, and a `MoveNext` method holding the user code. A
//! [`StateMachineDescriptor`] ties both together by token and carries everything the
//! debugger needs to step through the machine:
//!
//! - state slots, `(state number, syntax offset)` of every suspension point, used by Edit
//!   and Continue to map states across generations
//! - catch handler offsets and await points, used for async stepping
//! - hoisted local scopes indexed by hoist slot
//!
//! Descriptors are immutable once built. They never point back at method records, the
//! symbol writer joins them by token.

use crate::{
    file::parser::Parser,
    metadata::{
        customdebuginformation::AsyncSteppingInfo, localscope::HoistedLocalScope, token::Token,
    },
    utils::{write_compressed_int, write_compressed_uint},
    Result,
};

/// Kind of state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StateMachineKind {
    /// `yield return` iterator
    Iterator,
    /// `async` method
    Async,
    /// `async` iterator
    AsyncIterator,
}

impl StateMachineKind {
    /// Returns `true` for kinds that suspend at awaits.
    #[must_use]
    pub fn is_async(self) -> bool {
        matches!(self, StateMachineKind::Async | StateMachineKind::AsyncIterator)
    }
}

/// A suspension state and the syntax node that introduced it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StateSlot {
    /// State number
    pub state: i32,
    /// Syntax offset of the `await` / `yield`
    pub syntax_offset: i32,
}

/// IL offsets of an await.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AwaitPoint {
    /// Offset of the instruction after which the method yields
    pub yield_offset: u32,
    /// Offset execution resumes at
    pub resume_offset: u32,
}

/// Everything known about one state machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateMachineDescriptor {
    /// Kind
    pub kind: StateMachineKind,
    /// The method the user called
    pub kickoff: Token,
    /// The method with the user code
    pub move_next: Token,
    /// Name of the generated type
    pub type_name: String,
    /// States ordered by state number
    pub state_slots: Vec<StateSlot>,
    /// Catch handler offsets in `MoveNext`, ordered
    pub catch_handlers: Vec<u32>,
    /// Await points in `MoveNext`, ordered by yield offset
    pub await_points: Vec<AwaitPoint>,
    /// Hoisted local scopes indexed by hoist slot
    pub hoisted_locals: Vec<HoistedLocalScope>,
}

impl StateMachineDescriptor {
    /// The catch handler portable stepping information refers to.
    #[must_use]
    pub fn stepping_catch_handler(&self) -> Option<u32> {
        self.catch_handlers.first().copied()
    }

    /// The `AsyncMethodSteppingInformation` value attached to the kickoff method, `None`
    /// for iterators.
    #[must_use]
    pub fn stepping_info(&self) -> Option<AsyncSteppingInfo> {
        self.kind.is_async().then(|| AsyncSteppingInfo {
            catch_handler: self.stepping_catch_handler(),
            await_points: self.await_points.clone(),
            move_next: self.move_next,
        })
    }
}

/// Encodes an `EncStateMachineStateMap` blob.
///
/// ```text
/// Count (uint)  [-SyntaxOffsetBaseline (uint)]  { State (int), SyntaxOffset - base (uint) }*
/// ```
#[must_use]
pub fn encode_state_map(slots: &[StateSlot]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(2 + slots.len() * 3);
    write_compressed_uint(slots.len() as u32, &mut blob);
    if slots.is_empty() {
        return blob;
    }

    let baseline = slots
        .iter()
        .map(|slot| slot.syntax_offset)
        .min()
        .map_or(0, |min| min.min(0));
    write_compressed_uint(baseline.unsigned_abs(), &mut blob);
    for slot in slots {
        write_compressed_int(slot.state, &mut blob);
        write_compressed_uint(slot.syntax_offset.abs_diff(baseline), &mut blob);
    }
    blob
}

/// Decodes an `EncStateMachineStateMap` blob.
///
/// # Errors
/// Returns an error for truncated data or offsets out of range.
pub fn decode_state_map(blob: &[u8]) -> Result<Vec<StateSlot>> {
    let mut parser = Parser::new(blob);
    let count = parser.read_compressed_uint()?;
    if count == 0 {
        return Ok(Vec::new());
    }

    let baseline = -i64::from(parser.read_compressed_uint()?);
    let mut slots = Vec::with_capacity(count.min(1024) as usize);
    for _ in 0..count {
        let state = parser.read_compressed_int()?;
        let syntax_offset = i32::try_from(baseline + i64::from(parser.read_compressed_uint()?))
            .map_err(|_| malformed_error!("Syntax offset out of range in state map"))?;
        slots.push(StateSlot {
            state,
            syntax_offset,
        });
    }
    Ok(slots)
}

/// Builds a [`StateMachineDescriptor`].
#[derive(Debug)]
pub struct StateMachineDescriptorBuilder {
    descriptor: StateMachineDescriptor,
}

impl StateMachineDescriptorBuilder {
    /// Starts describing a state machine.
    #[must_use]
    pub fn describe(
        kind: StateMachineKind,
        kickoff: Token,
        move_next: Token,
        type_name: impl Into<String>,
    ) -> Self {
        StateMachineDescriptorBuilder {
            descriptor: StateMachineDescriptor {
                kind,
                kickoff,
                move_next,
                type_name: type_name.into(),
                state_slots: Vec::new(),
                catch_handlers: Vec::new(),
                await_points: Vec::new(),
                hoisted_locals: Vec::new(),
            },
        }
    }

    /// Adds a state.
    #[must_use]
    pub fn state_slot(mut self, state: i32, syntax_offset: i32) -> Self {
        self.descriptor.state_slots.push(StateSlot {
            state,
            syntax_offset,
        });
        self
    }

    /// Adds a catch handler offset.
    #[must_use]
    pub fn catch_handler(mut self, offset: u32) -> Self {
        self.descriptor.catch_handlers.push(offset);
        self
    }

    /// Adds an await point.
    #[must_use]
    pub fn await_point(mut self, yield_offset: u32, resume_offset: u32) -> Self {
        self.descriptor.await_points.push(AwaitPoint {
            yield_offset,
            resume_offset,
        });
        self
    }

    /// Adds the scope of the next hoist slot.
    #[must_use]
    pub fn hoisted_local(mut self, scope: HoistedLocalScope) -> Self {
        self.descriptor.hoisted_locals.push(scope);
        self
    }

    /// Validates and returns the descriptor.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if kickoff and `MoveNext` are the same or null,
    /// await points are given for an iterator, or a state number is used twice.
    pub fn build(self) -> Result<StateMachineDescriptor> {
        let mut descriptor = self.descriptor;

        if descriptor.kickoff.is_null()
            || descriptor.move_next.is_null()
            || descriptor.kickoff == descriptor.move_next
        {
            return Err(malformed_error!(
                "State machine {} needs distinct kickoff and MoveNext methods, got {} and {}",
                descriptor.type_name,
                descriptor.kickoff,
                descriptor.move_next
            ));
        }

        if !descriptor.kind.is_async() && !descriptor.await_points.is_empty() {
            return Err(malformed_error!(
                "Iterator state machine {} cannot have await points",
                descriptor.type_name
            ));
        }

        descriptor.state_slots.sort_by_key(|slot| slot.state);
        if let Some(pair) = descriptor
            .state_slots
            .windows(2)
            .find(|w| w[0].state == w[1].state)
        {
            return Err(malformed_error!(
                "State {} of {} is defined twice",
                pair[0].state,
                descriptor.type_name
            ));
        }

        descriptor.catch_handlers.sort_unstable();
        descriptor.catch_handlers.dedup();
        descriptor.await_points.sort_by_key(|point| point.yield_offset);

        Ok(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::customdebuginformation::{serialize, CustomDebugInfo},
        Error,
    };

    fn async_machine() -> StateMachineDescriptorBuilder {
        StateMachineDescriptorBuilder::describe(
            StateMachineKind::Async,
            Token::method_def(1),
            Token::method_def(4),
            "<M>d__0",
        )
    }

    #[test]
    fn build_sorts_and_validates() {
        let descriptor = async_machine()
            .state_slot(1, 40)
            .state_slot(0, 12)
            .catch_handler(0x50)
            .catch_handler(0x20)
            .await_point(0x30, 0x38)
            .await_point(0x10, 0x18)
            .build()
            .unwrap();

        assert_eq!(descriptor.state_slots[0].state, 0);
        assert_eq!(descriptor.catch_handlers, [0x20, 0x50]);
        assert_eq!(descriptor.await_points[0].yield_offset, 0x10);
        assert_eq!(descriptor.stepping_catch_handler(), Some(0x20));
    }

    #[test]
    fn duplicate_state_is_rejected() {
        let result = async_machine().state_slot(0, 1).state_slot(0, 2).build();
        assert!(matches!(result, Err(Error::Malformed { .. })));
    }

    #[test]
    fn iterator_rejects_awaits() {
        let result = StateMachineDescriptorBuilder::describe(
            StateMachineKind::Iterator,
            Token::method_def(1),
            Token::method_def(2),
            "<Items>d__1",
        )
        .await_point(1, 2)
        .build();
        assert!(result.is_err());
    }

    #[test]
    fn same_kickoff_and_move_next() {
        let result = StateMachineDescriptorBuilder::describe(
            StateMachineKind::Async,
            Token::method_def(3),
            Token::method_def(3),
            "<M>d__0",
        )
        .build();
        assert!(result.is_err());
    }

    #[test]
    fn stepping_info_blob() {
        let descriptor = async_machine()
            .catch_handler(0x20)
            .await_point(0x10, 0x18)
            .build()
            .unwrap();

        let info = CustomDebugInfo::AsyncMethodSteppingInformation(
            descriptor.stepping_info().unwrap(),
        );
        assert_eq!(
            serialize(&info).unwrap(),
            [
                0x21, 0, 0, 0, // catch handler + 1
                0x10, 0, 0, 0, 0x18, 0, 0, 0, // yield, resume
                0x04, // MoveNext row
            ]
        );
    }

    #[test]
    fn iterator_has_no_stepping_info() {
        let descriptor = StateMachineDescriptorBuilder::describe(
            StateMachineKind::Iterator,
            Token::method_def(1),
            Token::method_def(2),
            "<Items>d__1",
        )
        .build()
        .unwrap();
        assert!(descriptor.stepping_info().is_none());
    }

    #[test]
    fn state_map_blob() {
        let descriptor = async_machine()
            .state_slot(0, 12)
            .state_slot(-3, -4)
            .build()
            .unwrap();
        let blob = serialize(&CustomDebugInfo::EncStateMachineStateMap(
            descriptor.state_slots.clone(),
        ))
        .unwrap();
        assert_eq!(
            blob,
            [
                0x02, // count
                0x04, // -baseline
                0x7B, 0x00, // state -3, offset -4
                0x00, 0x10, // state 0, offset 12
            ]
        );
        assert_eq!(decode_state_map(&blob).unwrap(), descriptor.state_slots);
    }

    #[test]
    fn hoisted_scopes() {
        let descriptor = async_machine()
            .hoisted_local(HoistedLocalScope::new(0x10, 0x20))
            .hoisted_local(HoistedLocalScope::EMPTY)
            .build()
            .unwrap();
        let blob = serialize(&CustomDebugInfo::StateMachineHoistedLocalScopes(
            descriptor.hoisted_locals.clone(),
        ))
        .unwrap();
        assert_eq!(
            blob,
            [0x10, 0, 0, 0, 0x10, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]
        );
    }
}
