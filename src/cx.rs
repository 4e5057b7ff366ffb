use crate::{
    behavior::Balls, bus::EventBus, geometry::LayoutHost, model::LoopConfig,
    scene::SceneController, scroll::ScrollCoordinator,
};

/// Shared runtime services lent to blocks and behaviors for the duration of one call.
pub struct Cx<'a> {
    pub bus: &'a mut EventBus,
    pub scenes: &'a mut SceneController,
    pub host: &'a mut dyn LayoutHost,
    pub scroll: &'a mut ScrollCoordinator,
    pub config: &'a LoopConfig,
    pub balls: &'a mut Balls,
}

#[cfg(test)]
pub(crate) mod harness {
    use super::*;
    use crate::{core::BlockIndex, geometry::StackLayout, model::TemplateBlock};

    /// Owns everything a `Cx` borrows, for unit tests.
    pub(crate) struct Harness {
        pub(crate) bus: EventBus,
        pub(crate) scenes: SceneController,
        pub(crate) host: StackLayout,
        pub(crate) scroll: ScrollCoordinator,
        pub(crate) config: LoopConfig,
        pub(crate) balls: Balls,
    }

    impl Harness {
        pub(crate) fn new(viewport: f64) -> Self {
            Self {
                bus: EventBus::new(1_000),
                scenes: SceneController::new(viewport),
                host: StackLayout::new(viewport),
                scroll: ScrollCoordinator::new(300),
                config: LoopConfig::default(),
                balls: Balls::default(),
            }
        }

        /// Mount one block per height, indices starting at 0.
        pub(crate) fn with_blocks(viewport: f64, heights: &[f64]) -> Self {
            let mut h = Self::new(viewport);
            for (i, height) in heights.iter().enumerate() {
                h.host.mount(
                    BlockIndex(i as u64),
                    &TemplateBlock::new(format!("b{i}"), *height),
                );
            }
            h
        }

        pub(crate) fn cx(&mut self) -> Cx<'_> {
            Cx {
                bus: &mut self.bus,
                scenes: &mut self.scenes,
                host: &mut self.host,
                scroll: &mut self.scroll,
                config: &self.config,
                balls: &mut self.balls,
            }
        }

        /// Same services over a host the test owns.
        pub(crate) fn cx_on<'a>(&'a mut self, host: &'a mut dyn LayoutHost) -> Cx<'a> {
            Cx {
                bus: &mut self.bus,
                scenes: &mut self.scenes,
                host,
                scroll: &mut self.scroll,
                config: &self.config,
                balls: &mut self.balls,
            }
        }
    }
}
