use std::borrow::Cow;
use std::fmt;
use std::ops::RangeInclusive;

/// Distance range in cm for movement commands.
pub const DISTANCE_RANGE: RangeInclusive<i32> = 20..=500;

/// Rotation range in degrees.
pub const ROTATION_RANGE: RangeInclusive<i32> = 1..=3600;

/// Speed range in cm/s for `speed` and `go`.
pub const SPEED_RANGE: RangeInclusive<i32> = 10..=100;

/// Speed range in cm/s for `curve`.
pub const CURVE_SPEED_RANGE: RangeInclusive<i32> = 10..=60;

/// Remote control axis range.
pub const RC_RANGE: RangeInclusive<i32> = -100..=100;

/// Saturates `value` into `range`.
pub fn clamp(value: i32, range: RangeInclusive<i32>) -> i32 {
    value.clamp(*range.start(), *range.end())
}

/// Direction for the `flip` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlipDirection {
    Left,
    Right,
    Forward,
    Back,
}

impl FlipDirection {
    fn as_str(self) -> &'static str {
        match self {
            FlipDirection::Left => "l",
            FlipDirection::Right => "r",
            FlipDirection::Forward => "f",
            FlipDirection::Back => "b",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandArg {
    Int(i32),
    Text(&'static str),
}

impl fmt::Display for CommandArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandArg::Int(v) => write!(f, "{v}"),
            CommandArg::Text(s) => f.write_str(s),
        }
    }
}

/// A single SDK command, already clamped to the ranges the drone accepts.
///
/// Encodes (via `Display`) as the verb followed by its space separated
/// arguments, eg `"go 20 20 500 10"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    verb: Cow<'static, str>,
    args: Vec<CommandArg>,
}

impl Command {
    fn verb(verb: &'static str) -> Self {
        Self { verb: Cow::Borrowed(verb), args: vec![] }
    }

    fn with_ints(verb: &'static str, args: &[i32]) -> Self {
        Self {
            verb: Cow::Borrowed(verb),
            args: args.iter().copied().map(CommandArg::Int).collect(),
        }
    }

    fn distance(verb: &'static str, x: i32) -> Self {
        Self::with_ints(verb, &[clamp(x, DISTANCE_RANGE)])
    }

    /// Arbitrary command text, sent as is.
    pub fn custom(text: impl Into<String>) -> Self {
        Self { verb: Cow::Owned(text.into()), args: vec![] }
    }

    pub fn name(&self) -> &str {
        &self.verb
    }

    pub fn args(&self) -> &[CommandArg] {
        &self.args
    }

    /// Enter SDK mode.
    pub fn command() -> Self { Self::verb("command") }
    pub fn takeoff() -> Self { Self::verb("takeoff") }
    pub fn land() -> Self { Self::verb("land") }
    pub fn streamon() -> Self { Self::verb("streamon") }
    pub fn streamoff() -> Self { Self::verb("streamoff") }

    /// Stops all motors immediately.
    pub fn emergency() -> Self { Self::verb("emergency") }

    /// Stop and hover.
    pub fn stop() -> Self { Self::verb("stop") }

    pub fn up(x: i32) -> Self { Self::distance("up", x) }
    pub fn down(x: i32) -> Self { Self::distance("down", x) }
    pub fn left(x: i32) -> Self { Self::distance("left", x) }
    pub fn right(x: i32) -> Self { Self::distance("right", x) }
    pub fn forward(x: i32) -> Self { Self::distance("forward", x) }
    pub fn back(x: i32) -> Self { Self::distance("back", x) }

    pub fn cw(degrees: i32) -> Self {
        Self::with_ints("cw", &[clamp(degrees, ROTATION_RANGE)])
    }

    pub fn ccw(degrees: i32) -> Self {
        Self::with_ints("ccw", &[clamp(degrees, ROTATION_RANGE)])
    }

    pub fn flip(direction: FlipDirection) -> Self {
        Self {
            verb: Cow::Borrowed("flip"),
            args: vec![CommandArg::Text(direction.as_str())],
        }
    }

    /// Fly to `x y z` (relative, cm) at `speed` cm/s.
    pub fn go(x: i32, y: i32, z: i32, speed: i32) -> Self {
        Self::with_ints(
            "go",
            &[
                clamp(x, DISTANCE_RANGE),
                clamp(y, DISTANCE_RANGE),
                clamp(z, DISTANCE_RANGE),
                clamp(speed, SPEED_RANGE),
            ],
        )
    }

    /// Fly a curve through `(x1 y1 z1)` to `(x2 y2 z2)` at `speed` cm/s.
    #[allow(clippy::too_many_arguments)]
    pub fn curve(x1: i32, y1: i32, z1: i32, x2: i32, y2: i32, z2: i32, speed: i32) -> Self {
        let mut args: Vec<i32> = [x1, y1, z1, x2, y2, z2]
            .into_iter()
            .map(|v| clamp(v, DISTANCE_RANGE))
            .collect();
        args.push(clamp(speed, CURVE_SPEED_RANGE));
        Self::with_ints("curve", &args)
    }

    pub fn speed(speed: i32) -> Self {
        Self::with_ints("speed", &[clamp(speed, SPEED_RANGE)])
    }

    /// Remote control: left/right, forwards/backwards, up/down, yaw.
    pub fn rc(left_right: i32, forwards_backwards: i32, up_down: i32, yaw: i32) -> Self {
        Self::with_ints(
            "rc",
            &[
                clamp(left_right, RC_RANGE),
                clamp(forwards_backwards, RC_RANGE),
                clamp(up_down, RC_RANGE),
                clamp(yaw, RC_RANGE),
            ],
        )
    }

    // queries, the response text carries the value

    pub fn get_speed() -> Self { Self::verb("speed?") }
    pub fn get_battery() -> Self { Self::verb("battery?") }
    pub fn get_time() -> Self { Self::verb("time?") }
    pub fn get_height() -> Self { Self::verb("height?") }
    pub fn get_temperature() -> Self { Self::verb("temp?") }
    pub fn get_attitude() -> Self { Self::verb("attitude?") }
    pub fn get_barometer() -> Self { Self::verb("baro?") }
    pub fn get_acceleration() -> Self { Self::verb("acceleration?") }
    pub fn get_tof() -> Self { Self::verb("tof?") }
    pub fn get_wifi_snr() -> Self { Self::verb("wifi?") }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.verb)?;
        for a in &self.args {
            write!(f, " {a}")?;
        }
        Ok(())
    }
}
