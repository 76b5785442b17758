//! Chat command parsing.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Start,
    Stop,
    Restart,
    Update,
}

impl Action {
    pub fn verb(self) -> &'static str {
        match self {
            Action::Start => "start",
            Action::Stop => "stop",
            Action::Restart => "restart",
            Action::Update => "update",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Lifecycle { action: Action, game: String },
    Status,
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed {
    Command(Command),
    /// A lifecycle verb without its game argument.
    MissingGame(Action),
    /// Not addressed to us, or an unknown verb.
    Ignored,
}

pub fn parse(prefix: &str, content: &str) -> Parsed {
    let Some(rest) = content.trim_start().strip_prefix(prefix) else {
        return Parsed::Ignored;
    };
    let mut words = rest.split_whitespace();
    let Some(verb) = words.next() else {
        return Parsed::Ignored;
    };

    let action = match verb.to_lowercase().as_str() {
        "start" => Action::Start,
        "stop" => Action::Stop,
        "restart" => Action::Restart,
        "update" => Action::Update,
        "status" => return Parsed::Command(Command::Status),
        "help" => return Parsed::Command(Command::Help),
        _ => return Parsed::Ignored,
    };

    match words.next() {
        Some(game) => Parsed::Command(Command::Lifecycle {
            action,
            game: game.to_string(),
        }),
        None => Parsed::MissingGame(action),
    }
}
