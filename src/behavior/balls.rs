use crate::core::BlockIndex;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize)]
pub enum Ball {
    One,
    Two,
}

impl Ball {
    pub const ALL: [Ball; 2] = [Ball::One, Ball::Two];

    fn ordinal(self) -> usize {
        match self {
            Ball::One => 0,
            Ball::Two => 1,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize)]
pub enum BallState {
    #[default]
    Hidden,
    Shown {
        top: f64,
    },
    Dropped,
}

/// Copy of ball one carried on a block's rotating surface.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub enum BallClone {
    #[default]
    Absent,
    Attached(BlockIndex),
    Removed(BlockIndex),
}

/// Page-wide decorative balls, addressed by [`Ball`].
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize)]
pub struct Balls {
    slots: [BallState; 2],
    clone: BallClone,
}

impl Balls {
    pub fn state(&self, ball: Ball) -> BallState {
        self.slots[ball.ordinal()]
    }

    pub fn show(&mut self, ball: Ball, top: f64) {
        let slot = &mut self.slots[ball.ordinal()];
        if *slot != BallState::Dropped {
            *slot = BallState::Shown { top };
        }
    }

    /// Returns `false` if the ball was never shown or already dropped.
    pub fn drop_ball(&mut self, ball: Ball) -> bool {
        let slot = &mut self.slots[ball.ordinal()];
        match *slot {
            BallState::Shown { .. } => {
                *slot = BallState::Dropped;
                tracing::debug!(?ball, "ball dropped");
                true
            }
            _ => false,
        }
    }

    pub fn clone_state(&self) -> BallClone {
        self.clone
    }

    /// Put a copy of ball one on `owner`'s surface. A newer owner takes the clone over.
    pub fn clone_one(&mut self, owner: BlockIndex) {
        self.clone = BallClone::Attached(owner);
        tracing::debug!(owner = owner.0, "ball one cloned");
    }

    /// Drop the clone out of view and remove it. Only the block holding it may drop it.
    pub fn drop_clone(&mut self, owner: BlockIndex) -> bool {
        if self.clone != BallClone::Attached(owner) {
            return false;
        }
        self.clone = BallClone::Removed(owner);
        tracing::debug!(owner = owner.0, "cloned ball dropped");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balls_map_is_typed_and_one_way() {
        let mut balls = Balls::default();
        assert_eq!(balls.state(Ball::Two), BallState::Hidden);
        assert!(!balls.drop_ball(Ball::One));
        balls.show(Ball::One, 10.0);
        assert_eq!(balls.state(Ball::One), BallState::Shown { top: 10.0 });
        assert!(balls.drop_ball(Ball::One));
        balls.show(Ball::One, 20.0);
        assert_eq!(balls.state(Ball::One), BallState::Dropped);
        assert_eq!(balls.state(Ball::Two), BallState::Hidden);
    }

    #[test]
    fn clone_is_dropped_only_by_its_holder() {
        let mut balls = Balls::default();
        assert!(!balls.drop_clone(BlockIndex(3)));
        balls.clone_one(BlockIndex(3));
        balls.clone_one(BlockIndex(8));
        assert!(!balls.drop_clone(BlockIndex(3)));
        assert!(balls.drop_clone(BlockIndex(8)));
        assert_eq!(balls.clone_state(), BallClone::Removed(BlockIndex(8)));
        assert!(!balls.drop_clone(BlockIndex(8)));
    }
}
