//! Protocol command codes

use std::fmt;

use crate::error::{Error, Result};

/// Protocol command codes
///
/// Requests flow from the client to the terminal, `Ack*` codes flow back.
/// Codes the terminal does not know are still carried by [`crate::Packet`]
/// as raw `u16` values.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Command {
    // Connection commands
    Connect = 1000,
    Exit = 1001,
    EnableDevice = 1002,
    DisableDevice = 1003,
    Restart = 1004,
    PowerOff = 1005,
    Sleep = 1006,
    Resume = 1007,

    // Device interaction
    CaptureFinger = 1009,
    TestTemp = 1011,
    CaptureImage = 1012,
    RefreshData = 1013,
    RefreshOption = 1014,
    TestVoice = 1017,

    // Device information
    GetVersion = 1100,
    ChangeSpeed = 1101,
    Auth = 1102,

    // Data transfer
    PrepareData = 1500,
    Data = 1501,
    FreeData = 1502,
    PrepareBuffer = 1503,
    ReadBuffer = 1504,

    // Database operations
    DbRrq = 7,
    UserWrq = 8,
    UserTempRrq = 9,
    UserTempWrq = 10,
    OptionsRrq = 11,
    OptionsWrq = 12,
    AttLogRrq = 13,
    ClearData = 14,
    ClearAttLog = 15,
    DeleteUser = 18,
    DeleteUserTemp = 19,
    ClearAdmin = 20,
    GetUserTemp = 88,
    SaveUserTemps = 110,

    // Access control
    Unlock = 31,

    // Device status
    GetFreeSizes = 50,
    StartVerify = 60,
    StartEnroll = 61,
    CancelCapture = 62,
    StateRrq = 64,
    WriteLcd = 66,
    ClearLcd = 67,
    GetPinWidth = 69,

    // Time operations
    GetTime = 201,
    SetTime = 202,

    // Real-time events
    RegEvent = 500,

    // Response commands (from device)
    AckOk = 2000,
    AckError = 2001,
    AckData = 2002,
    AckRetry = 2003,
    AckRepeat = 2004,
    AckUnauth = 2005,
    AckUnknown = 0xFFFF,
    AckErrorCmd = 0xFFFD,
    AckErrorInit = 0xFFFC,
    AckErrorData = 0xFFFB,
}

impl Command {
    /// Check if this is a request command (from PC to device)
    pub fn is_request(self) -> bool {
        !self.is_response()
    }

    /// Check if this is a response command (from device to PC)
    pub fn is_response(self) -> bool {
        matches!(
            self,
            Self::AckOk
                | Self::AckError
                | Self::AckData
                | Self::AckRetry
                | Self::AckRepeat
                | Self::AckUnauth
                | Self::AckUnknown
                | Self::AckErrorCmd
                | Self::AckErrorInit
                | Self::AckErrorData
        )
    }

    /// Check if this is a success response
    pub fn is_success(self) -> bool {
        matches!(self, Self::AckOk | Self::AckData)
    }

    /// Check if this is an error response
    pub fn is_error(self) -> bool {
        matches!(
            self,
            Self::AckError
                | Self::AckUnknown
                | Self::AckErrorCmd
                | Self::AckErrorInit
                | Self::AckErrorData
        )
    }

    /// Vendor name of the command
    pub fn name(self) -> &'static str {
        match self {
            Self::Connect => "CMD_CONNECT",
            Self::Exit => "CMD_EXIT",
            Self::EnableDevice => "CMD_ENABLEDEVICE",
            Self::DisableDevice => "CMD_DISABLEDEVICE",
            Self::Restart => "CMD_RESTART",
            Self::PowerOff => "CMD_POWEROFF",
            Self::Sleep => "CMD_SLEEP",
            Self::Resume => "CMD_RESUME",
            Self::CaptureFinger => "CMD_CAPTUREFINGER",
            Self::TestTemp => "CMD_TEST_TEMP",
            Self::CaptureImage => "CMD_CAPTUREIMAGE",
            Self::RefreshData => "CMD_REFRESHDATA",
            Self::RefreshOption => "CMD_REFRESHOPTION",
            Self::TestVoice => "CMD_TESTVOICE",
            Self::GetVersion => "CMD_GET_VERSION",
            Self::ChangeSpeed => "CMD_CHANGE_SPEED",
            Self::Auth => "CMD_AUTH",
            Self::PrepareData => "CMD_PREPARE_DATA",
            Self::Data => "CMD_DATA",
            Self::FreeData => "CMD_FREE_DATA",
            Self::PrepareBuffer => "CMD_PREPARE_BUFFER",
            Self::ReadBuffer => "CMD_READ_BUFFER",
            Self::DbRrq => "CMD_DB_RRQ",
            Self::UserWrq => "CMD_USER_WRQ",
            Self::UserTempRrq => "CMD_USERTEMP_RRQ",
            Self::UserTempWrq => "CMD_USERTEMP_WRQ",
            Self::OptionsRrq => "CMD_OPTIONS_RRQ",
            Self::OptionsWrq => "CMD_OPTIONS_WRQ",
            Self::AttLogRrq => "CMD_ATTLOG_RRQ",
            Self::ClearData => "CMD_CLEAR_DATA",
            Self::ClearAttLog => "CMD_CLEAR_ATTLOG",
            Self::DeleteUser => "CMD_DELETE_USER",
            Self::DeleteUserTemp => "CMD_DELETE_USERTEMP",
            Self::ClearAdmin => "CMD_CLEAR_ADMIN",
            Self::GetUserTemp => "CMD_GET_USERTEMP",
            Self::SaveUserTemps => "CMD_SAVE_USERTEMPS",
            Self::Unlock => "CMD_UNLOCK",
            Self::GetFreeSizes => "CMD_GET_FREE_SIZES",
            Self::StartVerify => "CMD_STARTVERIFY",
            Self::StartEnroll => "CMD_STARTENROLL",
            Self::CancelCapture => "CMD_CANCELCAPTURE",
            Self::StateRrq => "CMD_STATE_RRQ",
            Self::WriteLcd => "CMD_WRITE_LCD",
            Self::ClearLcd => "CMD_CLEAR_LCD",
            Self::GetPinWidth => "CMD_GET_PINWIDTH",
            Self::GetTime => "CMD_GET_TIME",
            Self::SetTime => "CMD_SET_TIME",
            Self::RegEvent => "CMD_REG_EVENT",
            Self::AckOk => "CMD_ACK_OK",
            Self::AckError => "CMD_ACK_ERROR",
            Self::AckData => "CMD_ACK_DATA",
            Self::AckRetry => "CMD_ACK_RETRY",
            Self::AckRepeat => "CMD_ACK_REPEAT",
            Self::AckUnauth => "CMD_ACK_UNAUTH",
            Self::AckUnknown => "CMD_ACK_UNKNOWN",
            Self::AckErrorCmd => "CMD_ACK_ERROR_CMD",
            Self::AckErrorInit => "CMD_ACK_ERROR_INIT",
            Self::AckErrorData => "CMD_ACK_ERROR_DATA",
        }
    }
}

impl From<Command> for u16 {
    fn from(cmd: Command) -> u16 {
        cmd as u16
    }
}

impl TryFrom<u16> for Command {
    type Error = Error;

    fn try_from(value: u16) -> Result<Self> {
        let command = match value {
            1000 => Self::Connect,
            1001 => Self::Exit,
            1002 => Self::EnableDevice,
            1003 => Self::DisableDevice,
            1004 => Self::Restart,
            1005 => Self::PowerOff,
            1006 => Self::Sleep,
            1007 => Self::Resume,
            1009 => Self::CaptureFinger,
            1011 => Self::TestTemp,
            1012 => Self::CaptureImage,
            1013 => Self::RefreshData,
            1014 => Self::RefreshOption,
            1017 => Self::TestVoice,
            1100 => Self::GetVersion,
            1101 => Self::ChangeSpeed,
            1102 => Self::Auth,
            1500 => Self::PrepareData,
            1501 => Self::Data,
            1502 => Self::FreeData,
            1503 => Self::PrepareBuffer,
            1504 => Self::ReadBuffer,
            7 => Self::DbRrq,
            8 => Self::UserWrq,
            9 => Self::UserTempRrq,
            10 => Self::UserTempWrq,
            11 => Self::OptionsRrq,
            12 => Self::OptionsWrq,
            13 => Self::AttLogRrq,
            14 => Self::ClearData,
            15 => Self::ClearAttLog,
            18 => Self::DeleteUser,
            19 => Self::DeleteUserTemp,
            20 => Self::ClearAdmin,
            88 => Self::GetUserTemp,
            110 => Self::SaveUserTemps,
            31 => Self::Unlock,
            50 => Self::GetFreeSizes,
            60 => Self::StartVerify,
            61 => Self::StartEnroll,
            62 => Self::CancelCapture,
            64 => Self::StateRrq,
            66 => Self::WriteLcd,
            67 => Self::ClearLcd,
            69 => Self::GetPinWidth,
            201 => Self::GetTime,
            202 => Self::SetTime,
            500 => Self::RegEvent,
            2000 => Self::AckOk,
            2001 => Self::AckError,
            2002 => Self::AckData,
            2003 => Self::AckRetry,
            2004 => Self::AckRepeat,
            2005 => Self::AckUnauth,
            0xFFFF => Self::AckUnknown,
            0xFFFD => Self::AckErrorCmd,
            0xFFFC => Self::AckErrorInit,
            0xFFFB => Self::AckErrorData,
            _ => return Err(Error::UnknownCommand(value)),
        };
        Ok(command)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), *self as u16)
    }
}
