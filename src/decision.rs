//! Action decision engine.
//!
//! Turns one cycle's classified evidence into the set of actions to execute
//! and the telemetry record to publish. The engine never touches hardware;
//! the cycle driver executes what it returns.
//!
//! Rules, all evaluated every cycle (the result is their union):
//! 1. motion with a pet confirmed in the snapshot: close door, alert image
//! 2. motion without a pet, or with an indeterminate snapshot: no door action
//! 3. Hungry: feed
//! 4. Angry or Anxious: close door, alert image
//! 5. Happy: nothing
//!
//! Publish is always part of the set.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::capacity::CapacityMapper;
use crate::classify::{EmotionLabel, SoundLabel};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Action {
    Feed,
    CloseDoor,
    CaptureAlertImage,
    Publish,
}

/// Actions selected for one cycle. Duplicates collapse.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ActionSet(BTreeSet<Action>);

impl ActionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, action: Action) -> bool {
        self.0.insert(action)
    }

    pub fn contains(&self, action: Action) -> bool {
        self.0.contains(&action)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Actions in execution order (feed, door, alert image, publish).
    pub fn iter(&self) -> impl Iterator<Item = Action> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<Action> for ActionSet {
    fn from_iter<I: IntoIterator<Item = Action>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DoorState {
    Open,
    Closed,
}

impl fmt::Display for DoorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DoorState::Open => f.write_str("open"),
            DoorState::Closed => f.write_str("closed"),
        }
    }
}

/// Which food-level key the telemetry carries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FoodLevelField {
    /// Raw sensor distance as `food_level_cm`.
    #[default]
    Distance,
    /// Mapped percentage as `food_level_capacity`.
    Capacity,
}

/// Flat record handed to the telemetry sink. Built once per cycle.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TelemetryRecord {
    sound: SoundLabel,
    emotion: EmotionLabel,
    #[serde(skip_serializing_if = "Option::is_none")]
    food_level_cm: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    food_level_capacity: Option<f32>,
    motion_detected: bool,
    door_state: DoorState,
}

impl TelemetryRecord {
    pub fn sound(&self) -> SoundLabel {
        self.sound
    }

    pub fn emotion(&self) -> EmotionLabel {
        self.emotion
    }

    pub fn food_level_cm(&self) -> Option<f32> {
        self.food_level_cm
    }

    pub fn food_level_capacity(&self) -> Option<f32> {
        self.food_level_capacity
    }

    pub fn motion_detected(&self) -> bool {
        self.motion_detected
    }

    pub fn door_state(&self) -> DoorState {
        self.door_state
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// Evidence gathered by one cycle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DecisionInput {
    pub sound: SoundLabel,
    pub emotion: EmotionLabel,
    /// Raw motion sensor reading for this cycle.
    pub motion_detected: bool,
    /// Snapshot verdict; `None` when no capture ran or it was indeterminate.
    pub presence: Option<bool>,
    /// Food pot distance; `None` when the sensor read failed.
    pub food_distance_cm: Option<f32>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Decision {
    pub actions: ActionSet,
    pub telemetry: TelemetryRecord,
}

impl Decision {
    pub fn door_state(&self) -> DoorState {
        self.telemetry.door_state
    }
}

#[derive(Clone, Debug, Default)]
pub struct DecisionEngine {
    mapper: CapacityMapper,
    food_field: FoodLevelField,
}

impl DecisionEngine {
    pub fn new(mapper: CapacityMapper, food_field: FoodLevelField) -> Self {
        Self { mapper, food_field }
    }

    pub fn decide(&self, input: &DecisionInput) -> Decision {
        let mut actions = ActionSet::new();

        if input.motion_detected {
            match input.presence {
                Some(true) => {
                    log::info!("pet detected near the door, closing it");
                    actions.insert(Action::CloseDoor);
                    actions.insert(Action::CaptureAlertImage);
                }
                Some(false) => log::info!("motion without the pet, door left as is"),
                None => log::info!("motion with no presence verdict, door left as is"),
            }
        }

        if input.emotion == EmotionLabel::Hungry {
            actions.insert(Action::Feed);
        }
        if input.emotion.is_distressed() {
            actions.insert(Action::CloseDoor);
            actions.insert(Action::CaptureAlertImage);
        }

        actions.insert(Action::Publish);

        let door_state = if actions.contains(Action::CloseDoor) {
            DoorState::Closed
        } else {
            DoorState::Open
        };

        let (food_level_cm, food_level_capacity) = self.food_fields(input.food_distance_cm);

        Decision {
            actions,
            telemetry: TelemetryRecord {
                sound: input.sound,
                emotion: input.emotion,
                food_level_cm,
                food_level_capacity,
                motion_detected: input.motion_detected,
                door_state,
            },
        }
    }

    fn food_fields(&self, distance_cm: Option<f32>) -> (Option<f32>, Option<f32>) {
        let Some(distance_cm) = distance_cm else {
            return (None, None);
        };
        match self.food_field {
            FoodLevelField::Distance => match crate::capacity::validate_distance(distance_cm) {
                Ok(cm) => (Some(cm), None),
                Err(e) => {
                    log::warn!("food level omitted: {}", e);
                    (None, None)
                }
            },
            FoodLevelField::Capacity => match self.mapper.capacity_percent(distance_cm) {
                Ok(percent) => (None, Some(percent)),
                Err(e) => {
                    log::warn!("food level omitted: {}", e);
                    (None, None)
                }
            },
        }
    }
}
