use girder_pubsub::{BrokerConfig, Engine};

#[derive(Clone, PartialEq, prost::Message)]
pub struct Greeting {
    #[prost(string, tag = "1")]
    pub name: String,
}

pub fn mem_broker(topic: &str) -> BrokerConfig {
    BrokerConfig::new(Engine::Mem, topic, "")
}
