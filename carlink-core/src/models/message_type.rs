//! Protocol identifiers: message types and the enumerations carried inside
//! message payloads.

/// Recognized message type ids.
///
/// Ids outside this set are still framed and surfaced as
/// [`Message::Unknown`](crate::models::message::Message::Unknown).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MessageType {
    Open = 0x01,
    Plugged = 0x02,
    Phase = 0x03,
    Unplugged = 0x04,
    Touch = 0x05,
    VideoData = 0x06,
    AudioData = 0x07,
    Command = 0x08,
    LogoType = 0x09,
    BluetoothAddress = 0x0A,
    BluetoothPin = 0x0C,
    BluetoothDeviceName = 0x0D,
    WifiDeviceName = 0x0E,
    DisconnectPhone = 0x0F,
    BluetoothPairedList = 0x12,
    ManufacturerInfo = 0x14,
    CloseDongle = 0x15,
    MultiTouch = 0x17,
    HiCarLink = 0x18,
    BoxSettings = 0x19,
    NetworkMacAddress = 0x23,
    NetworkMacAddressAlt = 0x24,
    MediaData = 0x2A,
    NaviVideoData = 0x2C,
    SendFile = 0x99,
    HeartBeat = 0xAA,
    SoftwareVersion = 0xCC,
}

impl MessageType {
    pub const ALL: [MessageType; 27] = [
        Self::Open,
        Self::Plugged,
        Self::Phase,
        Self::Unplugged,
        Self::Touch,
        Self::VideoData,
        Self::AudioData,
        Self::Command,
        Self::LogoType,
        Self::BluetoothAddress,
        Self::BluetoothPin,
        Self::BluetoothDeviceName,
        Self::WifiDeviceName,
        Self::DisconnectPhone,
        Self::BluetoothPairedList,
        Self::ManufacturerInfo,
        Self::CloseDongle,
        Self::MultiTouch,
        Self::HiCarLink,
        Self::BoxSettings,
        Self::NetworkMacAddress,
        Self::NetworkMacAddressAlt,
        Self::MediaData,
        Self::NaviVideoData,
        Self::SendFile,
        Self::HeartBeat,
        Self::SoftwareVersion,
    ];

    pub fn from_id(id: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.id() == id)
    }

    pub fn id(self) -> u32 {
        self as u32
    }

    /// Name used in capture indexes and logs.
    pub fn name(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Plugged => "PLUGGED",
            Self::Phase => "PHASE",
            Self::Unplugged => "UNPLUGGED",
            Self::Touch => "TOUCH",
            Self::VideoData => "VIDEO_DATA",
            Self::AudioData => "AUDIO_DATA",
            Self::Command => "COMMAND",
            Self::LogoType => "LOGO_TYPE",
            Self::BluetoothAddress => "BLUETOOTH_ADDRESS",
            Self::BluetoothPin => "BLUETOOTH_PIN",
            Self::BluetoothDeviceName => "BLUETOOTH_DEVICE_NAME",
            Self::WifiDeviceName => "WIFI_DEVICE_NAME",
            Self::DisconnectPhone => "DISCONNECT_PHONE",
            Self::BluetoothPairedList => "BLUETOOTH_PAIRED_LIST",
            Self::ManufacturerInfo => "MANUFACTURER_INFO",
            Self::CloseDongle => "CLOSE_DONGLE",
            Self::MultiTouch => "MULTI_TOUCH",
            Self::HiCarLink => "HI_CAR_LINK",
            Self::BoxSettings => "BOX_SETTINGS",
            Self::NetworkMacAddress => "NETWORK_MAC_ADDRESS",
            Self::NetworkMacAddressAlt => "NETWORK_MAC_ADDRESS_ALT",
            Self::MediaData => "MEDIA_DATA",
            Self::NaviVideoData => "NAVI_VIDEO_DATA",
            Self::SendFile => "SEND_FILE",
            Self::HeartBeat => "HEART_BEAT",
            Self::SoftwareVersion => "SOFTWARE_VERSION",
        }
    }

    pub fn is_video(self) -> bool {
        matches!(self, Self::VideoData | Self::NaviVideoData)
    }
}

/// Name for a raw type id, `UNKNOWN` when unrecognized.
pub fn type_name(id: u32) -> &'static str {
    MessageType::from_id(id).map_or("UNKNOWN", MessageType::name)
}

/// Command ids carried in COMMAND messages, in both directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandMapping {
    Invalid,
    StartRecordAudio,
    StopRecordAudio,
    RequestHostUi,
    Siri,
    Mic,
    Frame,
    BoxMic,
    EnableNightMode,
    DisableNightMode,
    AudioTransferOn,
    AudioTransferOff,
    Wifi24g,
    Wifi5g,
    Left,
    Right,
    SelectDown,
    SelectUp,
    Back,
    Down,
    Home,
    Play,
    Pause,
    Next,
    Prev,
    RequestVideoFocus,
    ReleaseVideoFocus,
    WifiEnable,
    AutoConnectEnable,
    WifiConnect,
    ScanningDevice,
    DeviceFound,
    DeviceNotFound,
    ConnectDeviceFailed,
    BtConnected,
    BtDisconnected,
    WifiConnected,
    WifiDisconnected,
    BtPairStart,
    WifiPair,
}

impl CommandMapping {
    const TABLE: [(CommandMapping, u32); 40] = [
        (Self::Invalid, 0),
        (Self::StartRecordAudio, 1),
        (Self::StopRecordAudio, 2),
        (Self::RequestHostUi, 3),
        (Self::Siri, 5),
        (Self::Mic, 7),
        (Self::Frame, 12),
        (Self::BoxMic, 15),
        (Self::EnableNightMode, 16),
        (Self::DisableNightMode, 17),
        (Self::AudioTransferOn, 22),
        (Self::AudioTransferOff, 23),
        (Self::Wifi24g, 24),
        (Self::Wifi5g, 25),
        (Self::Left, 100),
        (Self::Right, 101),
        (Self::SelectDown, 104),
        (Self::SelectUp, 105),
        (Self::Back, 106),
        (Self::Down, 114),
        (Self::Home, 200),
        (Self::Play, 201),
        (Self::Pause, 202),
        (Self::Next, 204),
        (Self::Prev, 205),
        (Self::RequestVideoFocus, 500),
        (Self::ReleaseVideoFocus, 501),
        (Self::WifiEnable, 1000),
        (Self::AutoConnectEnable, 1001),
        (Self::WifiConnect, 1002),
        (Self::ScanningDevice, 1003),
        (Self::DeviceFound, 1004),
        (Self::DeviceNotFound, 1005),
        (Self::ConnectDeviceFailed, 1006),
        (Self::BtConnected, 1007),
        (Self::BtDisconnected, 1008),
        (Self::WifiConnected, 1009),
        (Self::WifiDisconnected, 1010),
        (Self::BtPairStart, 1011),
        (Self::WifiPair, 1012),
    ];

    /// Unmapped ids become `Invalid`.
    pub fn from_id(id: u32) -> Self {
        Self::TABLE
            .iter()
            .find(|(_, v)| *v == id)
            .map_or(Self::Invalid, |(c, _)| *c)
    }

    pub fn id(self) -> u32 {
        Self::TABLE
            .iter()
            .find(|(c, _)| *c == self)
            .map_or(0, |(_, v)| *v)
    }
}

/// Command byte carried in a one-byte AUDIO_DATA trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioCommand {
    OutputStart,
    OutputStop,
    InputConfig,
    PhonecallStart,
    PhonecallStop,
    NaviStart,
    NaviStop,
    SiriStart,
    SiriStop,
    MediaStart,
    MediaStop,
    AlertStart,
    AlertStop,
}

impl AudioCommand {
    pub fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            1 => Self::OutputStart,
            2 => Self::OutputStop,
            3 => Self::InputConfig,
            4 => Self::PhonecallStart,
            5 => Self::PhonecallStop,
            6 => Self::NaviStart,
            7 => Self::NaviStop,
            8 => Self::SiriStart,
            9 => Self::SiriStop,
            10 => Self::MediaStart,
            11 => Self::MediaStop,
            12 => Self::AlertStart,
            13 => Self::AlertStop,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhoneType {
    AndroidMirror,
    CarPlay,
    IphoneMirror,
    AndroidAuto,
    HiCar,
    Unknown,
}

impl PhoneType {
    pub fn from_id(id: u32) -> Self {
        match id {
            1 => Self::AndroidMirror,
            3 => Self::CarPlay,
            4 => Self::IphoneMirror,
            5 => Self::AndroidAuto,
            6 => Self::HiCar,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    Data,
    AlbumCover,
    Unknown,
}

impl MediaType {
    pub fn from_id(id: u32) -> Self {
        match id {
            1 => Self::Data,
            3 => Self::AlbumCover,
            _ => Self::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_ids_round_trip() {
        for t in MessageType::ALL {
            assert_eq!(MessageType::from_id(t.id()), Some(t));
        }
        assert_eq!(MessageType::from_id(0x0B), None);
        assert_eq!(MessageType::from_id(0xFFFF), None);
    }

    #[test]
    fn type_names() {
        assert_eq!(type_name(0x06), "VIDEO_DATA");
        assert_eq!(type_name(0x2C), "NAVI_VIDEO_DATA");
        assert_eq!(type_name(0x1234), "UNKNOWN");
    }

    #[test]
    fn command_mapping_lookup() {
        assert_eq!(CommandMapping::from_id(500), CommandMapping::RequestVideoFocus);
        assert_eq!(CommandMapping::from_id(1012), CommandMapping::WifiPair);
        assert_eq!(CommandMapping::from_id(4), CommandMapping::Invalid);
        assert_eq!(CommandMapping::Frame.id(), 12);
    }

    #[test]
    fn phone_and_media_types() {
        assert_eq!(PhoneType::from_id(3), PhoneType::CarPlay);
        assert_eq!(PhoneType::from_id(2), PhoneType::Unknown);
        assert_eq!(MediaType::from_id(3), MediaType::AlbumCover);
        assert_eq!(MediaType::from_id(2), MediaType::Unknown);
        assert_eq!(AudioCommand::from_byte(6), Some(AudioCommand::NaviStart));
        assert_eq!(AudioCommand::from_byte(0), None);
    }
}
