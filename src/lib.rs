#![forbid(unsafe_code)]

pub mod arrow;
pub mod behavior;
pub mod block;
pub mod bus;
pub mod core;
pub mod cx;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod indicator;
pub mod model;
pub mod scene;
pub mod scroll;
pub mod sequence;
pub mod tween;

pub use arrow::{ArrowDownButton, ArrowState};
pub use behavior::{Ball, BallClone, BallState, Balls, Behavior, BlockInfo, Lifecycle};
pub use block::{BlockState, ContentBlock};
pub use bus::{Event, EventBus, ObserverId, Subscriber, SubscriptionId, Topic};
pub use core::{Background, BlockIndex, BlockRange, Generation, ScrollDirection};
pub use cx::Cx;
pub use engine::{Engine, EngineSummary};
pub use error::{LoopError, LoopResult};
pub use geometry::{LayoutHost, Measured, StackLayout, VisualEffect};
pub use indicator::{PositionIndicator, Waypoint};
pub use model::{BehaviorKind, LoopConfig, PageSpec, RotatorParams, TemplateBlock, Viewport};
pub use scene::{SceneController, SceneEvent, SceneEventKind, SceneSpec, SceneState};
pub use scroll::{ScrollCoordinator, ScrollSource};
pub use sequence::{DeferReason, DuplicateOutcome, EvictOutcome, SequenceManager};
pub use tween::{Ease, Tween};
