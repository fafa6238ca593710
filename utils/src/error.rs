use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Unable to read settings from the environment: {}", source))]
    Settings { source: envy::Error },

    #[snafu(display("Settings do not describe a usable poll policy: {}", source))]
    Policy { source: kong_waiter::Error },
}

pub type Result<T> = std::result::Result<T, Error>;
