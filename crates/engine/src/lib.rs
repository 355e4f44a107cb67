//! The narration loop — the heart of Veilwright.
//!
//! One player turn follows a **request → stream → execute** cycle:
//!
//! 1. **Send** the whole conversation and the tool catalogue to the LLM
//! 2. **Stream** the reply, surfacing narration deltas as they arrive and
//!    reassembling tool-call fragments by index
//! 3. **If tool calls**: execute them in order, append the results, loop
//!    back to step 1
//! 4. **If narration only**: the turn is complete
//!
//! The loop continues until the model stops on its own or the round safety
//! bound (8) is reached.

pub mod accumulator;
pub mod narrator;
pub mod stream_event;

pub use accumulator::FragmentAccumulator;
pub use narrator::{NarrationOutcome, Narrator};
pub use stream_event::NarrationEvent;
