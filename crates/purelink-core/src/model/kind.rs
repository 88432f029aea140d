// ── Device models and their capabilities ──

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Functional class of an appliance, exported as `type`, `type1`, … tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
pub enum DeviceClass {
    Fan,
    Heater,
    Purifier,
}

/// Services a device can be asked to run by the platform.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum ServiceId {
    SetPower,
    SetOscillation,
    SetSpeed,
    SetMonitoring,
    GetDeviceState,
    GetSensorReadings,
}

const ALL_SERVICES: &[ServiceId] = &[
    ServiceId::SetPower,
    ServiceId::SetOscillation,
    ServiceId::SetSpeed,
    ServiceId::SetMonitoring,
    ServiceId::GetDeviceState,
    ServiceId::GetSensorReadings,
];

/// Static capability set of a model.
#[derive(Debug)]
pub struct ModelDescriptor {
    pub model_number: &'static str,
    pub name: &'static str,
    pub classes: &'static [DeviceClass],
    pub services: &'static [ServiceId],
    /// Sensor samples are pushed to the platform as events.
    pub push_readings: bool,
}

/// Supported appliance models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    PureCoolLink,
    PureCoolLinkDesk,
    PureHotCoolLink,
}

static PURE_COOL_LINK: ModelDescriptor = ModelDescriptor {
    model_number: "475",
    name: "Dyson Pure Cool Link",
    classes: &[DeviceClass::Fan, DeviceClass::Purifier],
    services: ALL_SERVICES,
    push_readings: true,
};

static PURE_COOL_LINK_DESK: ModelDescriptor = ModelDescriptor {
    model_number: "469",
    name: "Dyson Pure Cool Link Desk",
    classes: &[DeviceClass::Fan, DeviceClass::Purifier],
    services: ALL_SERVICES,
    push_readings: false,
};

static PURE_HOT_COOL_LINK: ModelDescriptor = ModelDescriptor {
    model_number: "455",
    name: "Dyson Pure Hot + Cool Link",
    classes: &[DeviceClass::Fan, DeviceClass::Heater, DeviceClass::Purifier],
    services: ALL_SERVICES,
    push_readings: false,
};

impl ModelKind {
    pub const ALL: [Self; 3] = [
        Self::PureCoolLink,
        Self::PureCoolLinkDesk,
        Self::PureHotCoolLink,
    ];

    /// Resolve a cloud `ProductType` such as `"475"`.
    pub fn from_model_number(model_number: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.model_number() == model_number)
    }

    pub fn descriptor(self) -> &'static ModelDescriptor {
        match self {
            Self::PureCoolLink => &PURE_COOL_LINK,
            Self::PureCoolLinkDesk => &PURE_COOL_LINK_DESK,
            Self::PureHotCoolLink => &PURE_HOT_COOL_LINK,
        }
    }

    pub fn model_number(self) -> &'static str {
        self.descriptor().model_number
    }

    pub fn supports(self, service: ServiceId) -> bool {
        self.descriptor().services.contains(&service)
    }

    pub fn pushes_readings(self) -> bool {
        self.descriptor().push_readings
    }
}
