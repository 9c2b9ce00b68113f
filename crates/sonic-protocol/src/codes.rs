//! Numeric command codes.
//!
//! The code space is open: devices may answer with codes this crate has no
//! name for, so [`CommandCode`] is a thin wrapper over `u16` with named
//! constants for every code the host knows about. Codes from
//! [`CommandCode::ERROR_BASE`] upwards are reserved for device-originated
//! error answers.

use std::fmt;
use std::str::FromStr;

use crate::ParseValueError;

/// A command, notification or error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CommandCode(pub u16);

macro_rules! command_codes {
    ($($name:ident = $value:literal),+ $(,)?) => {
        impl CommandCode {
            $(pub const $name: CommandCode = CommandCode($value);)+

            /// Every named code in declaration order.
            pub const NAMED: &'static [(CommandCode, &'static str)] = &[
                $((CommandCode($value), stringify!($name))),+
            ];
        }
    };
}

command_codes! {
    GET_PROTOCOL = 0,
    GET_INFO = 1,
    GET_HELP = 2,
    GET_UPDATE = 3,
    GET_SWF = 10,
    GET_FREQ = 20,
    GET_GAIN = 30,
    GET_SIGNAL = 40,
    GET_TEMP = 50,
    GET_UIPT = 70,
    GET_IRMS = 80,
    GET_TRANSDUCER_ID = 90,
    GET_ATF_LIST = 100,
    GET_ATF = 101,
    GET_ATK = 111,
    GET_ATT = 121,
    GET_DATETIME = 130,
    GET_RAMP = 310,
    GET_SCAN = 320,
    GET_TUNE = 330,
    GET_WIPE = 340,
    GET_AUTO = 350,
    GET_ADC = 360,
    SET_SWF = 1010,
    SET_FREQ = 1020,
    SET_GAIN = 1030,
    SET_OFF = 1040,
    SET_ON = 1041,
    SET_TRANSDUCER_ID = 1090,
    SET_ATF = 1101,
    SET_ATK = 1111,
    SET_ATT = 1121,
    SET_DATETIME = 1130,
    SET_WAVEFORM = 1140,
    SET_LOG_LEVEL = 1150,
    SET_RAMP = 1310,
    SET_RAMP_F_START = 1311,
    SET_RAMP_F_STOP = 1312,
    SET_RAMP_F_STEP = 1313,
    SET_RAMP_T_ON = 1314,
    SET_RAMP_T_OFF = 1315,
    SET_SCAN = 1320,
    SET_SCAN_F_RANGE = 1321,
    SET_SCAN_F_STEP = 1322,
    SET_SCAN_T_STEP = 1323,
    SET_SCAN_GAIN = 1324,
    SET_SCAN_F_SHIFT = 1325,
    SET_TUNE = 1330,
    SET_TUNE_F_STEP = 1331,
    SET_TUNE_T_TIME = 1332,
    SET_TUNE_T_STEP = 1333,
    SET_TUNE_F_SHIFT = 1334,
    SET_TUNE_N_STEPS = 1335,
    SET_TUNE_GAIN = 1336,
    SET_WIPE = 1340,
    SET_WIPE_F_RANGE = 1341,
    SET_WIPE_F_STEP = 1342,
    SET_WIPE_T_ON = 1343,
    SET_WIPE_T_OFF = 1344,
    SET_WIPE_T_PAUSE = 1345,
    SET_WIPE_GAIN = 1346,
    SET_AUTO = 1350,
    SET_INPUT_SOURCE = 2000,
    SET_COM_PROT = 2010,
    SET_PHYS_COM_CHANNEL = 2020,
    SET_TERMINATION = 2030,
    CLEAR_ERRORS = 2040,
    SET_STOP = 3000,
    SET_CONTINUE = 3010,
    SET_PAUSE = 3020,
    GET_PVAL = 9010,
    NOTIFY_MESSAGE = 18000,
    NOTIFY_PROCEDURE_FAILURE = 18100,
    GET_DATETIME_PICO = 19000,
    RESTART_DEVICE = 19010,
    SONIC_FORCE = 19040,
    INTERNAL_DEVICE_ERROR = 20000,
    COMMAND_NOT_KNOWN = 20001,
    COMMAND_NOT_IMPLEMENTED = 20002,
    COMMAND_NOT_PERMITTED = 20003,
    SYNTAX_ERROR = 20004,
    INVALID_VALUE = 20005,
    PARSING_ERROR = 20006,
}

impl CommandCode {
    /// First code of the device error range.
    pub const ERROR_BASE: u16 = 20000;

    /// Get the raw numeric code.
    pub fn value(&self) -> u16 {
        self.0
    }

    /// Get the symbolic name, if the code is known.
    pub fn name(&self) -> Option<&'static str> {
        CommandCode::NAMED
            .iter()
            .find(|(code, _)| code == self)
            .map(|(_, name)| *name)
    }

    /// Check if the code denotes a device-reported error.
    pub fn is_error(&self) -> bool {
        self.0 >= Self::ERROR_BASE
    }
}

impl From<u16> for CommandCode {
    fn from(value: u16) -> Self {
        CommandCode(value)
    }
}

impl fmt::Display for CommandCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}({})", name, self.0),
            None => write!(f, "{}", self.0),
        }
    }
}

impl FromStr for CommandCode {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(value) = s.parse::<u16>() {
            return Ok(CommandCode(value));
        }
        CommandCode::NAMED
            .iter()
            .find(|(_, name)| name.eq_ignore_ascii_case(s))
            .map(|(code, _)| *code)
            .ok_or_else(|| ParseValueError::new("CommandCode", s))
    }
}
