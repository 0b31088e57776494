use crate::relay::Relay;

/// [`RelayBuilder`] configures and builds a [`Relay`].
///
/// All settings are optional. A relay built without any configuration is equivalent to
/// [`Relay::new`].
#[derive(Clone, Debug, Default)]
pub struct RelayBuilder {
    pub(crate) name: Option<String>,
}

impl RelayBuilder {
    /// Initializes a new [`RelayBuilder`] with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the name of the relay.
    ///
    /// The name is attached to every log record the relay emits, which helps to tell apart
    /// multiple relays in the same process.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Builds a [`Relay`] for values of type `T` with the configured settings.
    pub fn build<T>(self) -> Relay<T> {
        Relay::from_builder(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unnamed() {
        let relay = RelayBuilder::new().build::<()>();
        assert_eq!(relay.name(), None);
        assert!(relay.is_empty());
        assert!(!relay.is_closed());
    }

    #[test]
    fn test_name() {
        let relay = RelayBuilder::new().name("config-updates").build::<u32>();
        assert_eq!(relay.name(), Some("config-updates"));
    }
}
