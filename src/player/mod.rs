// 播放器核心模块

pub mod state;
pub mod events;
pub mod command;
pub mod executor;
pub mod rate;
pub mod manager;

pub use state::{is_valid_transition, ReadySignal, StateMachine};
pub use events::{NoopCallbacks, PlaybackCallbacks};
pub use command::{
    Command, CommandHandler, CommandLoop, CommandSender, PipelineEvent, PostOutcome, SeekDirection, SeekStep,
};
pub use executor::PlaybackExecutor;
pub use rate::{trick_target, ClockRequest, RateController, RateCore};
pub use manager::{OpenOutcome, PlaybackManager, PlayerContext};
