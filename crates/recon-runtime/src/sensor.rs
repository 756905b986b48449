//! Sensors (§4.6): "A Sensor at Lens `L` produces a lazy sequence of values
//! of the type at `L`. The agent subscribes; each emitted value is applied
//! to the state at the bound path as an `update` operation."

use futures::stream::BoxStream;
use recon_core::lens::Lens;
use serde_json::Value;

/// A live source of values for a single path in the state tree. Implementors
/// typically wrap a channel, a poller, or an external subscription; the
/// [`Sensor::subscribe`] stream is the "lazy sequence" the design calls for —
/// nothing is produced until the agent polls it.
pub trait Sensor: Send + Sync {
    /// The concrete path this sensor feeds. Sensors bound to a templated
    /// [`Lens`] are expected to be registered once per concrete binding.
    fn lens(&self) -> &Lens;

    /// A stream of values to apply at [`Sensor::lens`] as `update`
    /// operations, one per emission.
    fn subscribe(&self) -> BoxStream<'static, Value>;
}

/// A [`Sensor`] backed by a `tokio::sync::mpsc` channel, for tests and for
/// in-process producers that push values directly.
pub struct ChannelSensor {
    lens: Lens,
    rx: tokio::sync::Mutex<Option<tokio::sync::mpsc::Receiver<Value>>>,
}

impl ChannelSensor {
    pub fn new(lens: Lens) -> (Self, tokio::sync::mpsc::Sender<Value>) {
        let (tx, rx) = tokio::sync::mpsc::channel(32);
        (Self { lens, rx: tokio::sync::Mutex::new(Some(rx)) }, tx)
    }
}

impl Sensor for ChannelSensor {
    fn lens(&self) -> &Lens {
        &self.lens
    }

    fn subscribe(&self) -> BoxStream<'static, Value> {
        let rx = self.rx.try_lock().ok().and_then(|mut guard| guard.take());
        let rx = rx.expect("ChannelSensor::subscribe called more than once");
        Box::pin(tokio_stream::wrappers::ReceiverStream::new(rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;

    #[tokio::test]
    async fn channel_sensor_forwards_emitted_values() {
        let (sensor, tx) = ChannelSensor::new(Lens::parse("/temperature").unwrap());
        let mut stream = sensor.subscribe();
        tx.send(json!(21.5)).await.unwrap();
        tx.send(json!(22.0)).await.unwrap();
        drop(tx);

        assert_eq!(stream.next().await, Some(json!(21.5)));
        assert_eq!(stream.next().await, Some(json!(22.0)));
        assert_eq!(stream.next().await, None);
    }

    #[test]
    fn sensor_exposes_its_lens() {
        let (sensor, _tx) = ChannelSensor::new(Lens::parse("/counters/:k").unwrap());
        assert_eq!(sensor.lens().raw(), "/counters/:k");
    }
}
