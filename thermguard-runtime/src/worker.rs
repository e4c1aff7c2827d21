//! Cross-check worker: the deviation checker and the majority voter
//!
//! Both consumers have the same shape, so one task drives any
//! [`RedundancyStrategy`]:
//!
//! ```text
//! loop:
//!   receive(upstream, unbounded)
//!     ├─ malformed  ──► warn, release, continue
//!     └─ well-formed ──► release ──► combine ──► send_or_drop(downstream)
//! ```
//!
//! The input is decoded in place and released before the downstream send,
//! so a slow monitor never holds upstream space.

use std::fmt::Debug;
use std::time::Duration;

use log::{debug, info, warn};
use thermguard_core::RedundancyStrategy;
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;
use crate::relay::RelayChannel;

/// Consumer applying one redundancy strategy between two relays
#[derive(Debug)]
pub struct CrossCheckWorker<S> {
    strategy: S,
    input: RelayChannel,
    output: RelayChannel,
    send_timeout: Duration,
}

impl<S> CrossCheckWorker<S>
where
    S: RedundancyStrategy,
    S::Output: Debug,
{
    /// Worker reading `input` and writing `output`
    pub fn new(
        strategy: S,
        input: RelayChannel,
        output: RelayChannel,
        send_timeout: Duration,
    ) -> Self {
        Self { strategy, input, output, send_timeout }
    }

    /// Run until cancelled or the relay is misused
    pub async fn run(self, cancel: CancellationToken) -> Result<(), TaskError> {
        info!(
            "{}: {} -> {}",
            self.strategy.name(),
            self.input.name(),
            self.output.name()
        );
        loop {
            let received = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                received = self.input.receive(None) => received?,
            };

            let input = match received.decode::<S::Input>()? {
                Ok(input) => input,
                Err(err) => {
                    warn!(
                        "{}: skipping malformed {}-byte record: {}",
                        self.strategy.name(),
                        received.len(),
                        err
                    );
                    received.release()?;
                    continue;
                }
            };
            received.release()?;

            let output = self.strategy.combine(&input);
            debug!("{}: {:?}", self.strategy.name(), output);
            self.output.send_or_drop(&output, self.send_timeout).await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thermguard_core::{
        AveragedSample, AveragingVote, BitmaskMajorityVote, DataSource, DeviationCheck, Record,
        SensorSample, TripleSample, VotedSample,
    };

    fn channels() -> (RelayChannel, RelayChannel) {
        (RelayChannel::new("checker", 128), RelayChannel::new("monitor", 128))
    }

    type Running = (CancellationToken, tokio::task::JoinHandle<Result<(), TaskError>>);

    fn spawn<S>(strategy: S, input: &RelayChannel, output: &RelayChannel) -> Running
    where
        S: RedundancyStrategy + Send + 'static,
        S::Input: Send,
        S::Output: Debug + Send + Sync,
    {
        let cancel = CancellationToken::new();
        let timeout = Duration::from_millis(100);
        let worker = CrossCheckWorker::new(strategy, input.clone(), output.clone(), timeout);
        (cancel.clone(), tokio::spawn(worker.run(cancel)))
    }

    #[tokio::test]
    async fn checker_forwards_deviation() {
        let (input, output) = channels();
        let (cancel, task) = spawn(DeviationCheck, &input, &output);

        input.send_record(&SensorSample::paired(20.0, 23.5), Duration::ZERO).await.unwrap();
        let rec = output.receive(Some(Duration::from_secs(1))).await.unwrap();
        let checked = rec.decode::<SensorSample>().unwrap().unwrap();
        assert_eq!(checked.source, DataSource::Checker);
        assert_eq!(checked.deviation, 3.5);
        rec.release().unwrap();

        // Upstream space is returned
        assert_eq!(input.in_flight_bytes(), 0);
        cancel.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn malformed_input_is_skipped() {
        let (input, output) = channels();
        let (cancel, task) = spawn(DeviationCheck, &input, &output);

        input.send(&[0xFF, 1, 2], Duration::ZERO).await.unwrap();
        input.send_record(&SensorSample::paired(1.0, 2.0), Duration::ZERO).await.unwrap();

        let rec = output.receive(Some(Duration::from_secs(1))).await.unwrap();
        assert_eq!(rec.decode::<SensorSample>().unwrap().unwrap().deviation, 1.0);
        assert_eq!(input.stats().released, 2);

        cancel.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn voters_emit_their_own_record_kinds() {
        let triple = TripleSample { raw: [0b1010, 0b1000, 0b0010], celsius: [21.0, 22.0, 26.0] };

        let (input, output) = (RelayChannel::new("voter", 128), RelayChannel::new("monitor", 128));
        let (cancel, task) = spawn(BitmaskMajorityVote::new(0xFF), &input, &output);
        input.send_record(&triple, Duration::ZERO).await.unwrap();
        let rec = output.receive(Some(Duration::from_secs(1))).await.unwrap();
        assert_eq!(rec.len(), VotedSample::FRAME_LEN);
        assert_eq!(rec.decode::<VotedSample>().unwrap().unwrap(), VotedSample(0b1010));
        cancel.cancel();
        task.await.unwrap().unwrap();

        let (input, output) = (RelayChannel::new("voter", 128), RelayChannel::new("monitor", 128));
        let (cancel, task) = spawn(AveragingVote, &input, &output);
        input.send_record(&triple, Duration::ZERO).await.unwrap();
        let rec = output.receive(Some(Duration::from_secs(1))).await.unwrap();
        assert_eq!(rec.decode::<AveragedSample>().unwrap().unwrap(), AveragedSample(23.0));
        cancel.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn full_downstream_drops_and_keeps_going() {
        let input = RelayChannel::new("checker", 128);
        let output = RelayChannel::new("monitor", SensorSample::FRAME_LEN);
        let (cancel, task) = spawn(DeviationCheck, &input, &output);

        for _ in 0..3 {
            input.send_record(&SensorSample::paired(1.0, 2.0), Duration::ZERO).await.unwrap();
        }
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(output.stats().committed, 1);
        assert_eq!(output.stats().dropped, 2);
        assert_eq!(input.in_flight_bytes(), 0);
        cancel.cancel();
        task.await.unwrap().unwrap();
    }
}
