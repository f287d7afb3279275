use std::time::Duration;

#[cfg(not(any(
    feature = "default-timeout-100ms",
    feature = "default-timeout-250ms",
    feature = "default-timeout-1s"
)))]
compile_error!("Select one of the default-timeout-x features");

#[cfg(all(
    feature = "default-timeout-100ms",
    any(feature = "default-timeout-250ms", feature = "default-timeout-1s")
))]
compile_error!("Select only one of the default-timeout-x features");
#[cfg(all(
    feature = "default-timeout-250ms",
    any(feature = "default-timeout-100ms", feature = "default-timeout-1s")
))]
compile_error!("Select only one of the default-timeout-x features");
#[cfg(all(
    feature = "default-timeout-1s",
    any(feature = "default-timeout-100ms", feature = "default-timeout-250ms")
))]
compile_error!("Select only one of the default-timeout-x features");

#[cfg(feature = "default-timeout-100ms")]
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(100);
#[cfg(feature = "default-timeout-250ms")]
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(250);
#[cfg(feature = "default-timeout-1s")]
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1_000);

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Timeout {
    /// Timeout configured on the bus, which in turn defaults to the one set via feature flags.
    #[default]
    Default,
    /// Specified timeout in milliseconds.
    Millis(u64),
    /// Wait until a matching frame arrives or the bus exits.
    Never,
}

impl Timeout {
    /// Resolve to a concrete deadline offset, `None` meaning no deadline.
    pub(crate) fn resolve(&self, default: Option<Duration>) -> Option<Duration> {
        match self {
            Timeout::Default => default,
            Timeout::Millis(millis) => Some(Duration::from_millis(*millis)),
            Timeout::Never => None,
        }
    }
}

impl From<Duration> for Timeout {
    fn from(duration: Duration) -> Self {
        Timeout::Millis(duration.as_millis() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve() {
        let bus_default = Some(Duration::from_millis(40));
        assert_eq!(Timeout::Default.resolve(bus_default), bus_default);
        assert_eq!(Timeout::Default.resolve(None), None);
        assert_eq!(
            Timeout::Millis(5).resolve(bus_default),
            Some(Duration::from_millis(5))
        );
        assert_eq!(Timeout::Never.resolve(bus_default), None);
        assert_eq!(
            Timeout::from(Duration::from_secs(2)),
            Timeout::Millis(2_000)
        );
    }
}
