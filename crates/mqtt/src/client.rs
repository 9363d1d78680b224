use std::sync::{Arc, atomic::{AtomicBool, Ordering}};
use std::time::Duration;
use std::collections::HashMap;

use rumqttc::{AsyncClient, ClientError, Event, EventLoop, Incoming, LastWill, MqttOptions, Outgoing, QoS, Transport};
use tokio::sync::{broadcast, RwLock, Mutex};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::{MqttConfig, Presence};

#[derive(Debug, Clone)]
pub enum MqttEvent {
    Connected,
    Disconnected,
    Publish { topic: String, payload: Vec<u8> },
    PubAck(u16),
    Error(String),
}

#[derive(Clone)]
pub struct MqttService {
    client: Arc<Mutex<AsyncClient>>,
    ready: Arc<AtomicBool>,
    events_tx: broadcast::Sender<MqttEvent>,
    subscriptions: Arc<RwLock<HashMap<String, QoS>>>,
    // Keeps the event loop task tied to the service lifetime
    _loop_handle: Arc<JoinHandle<()>>,
}

impl MqttService {
    pub async fn connect(config: MqttConfig) -> Result<Self, ClientError> {
        let (client, eventloop) = build_client(&config)?;
        let ready = Arc::new(AtomicBool::new(false));
        let (tx, _) = broadcast::channel(256);
        let subscriptions = Arc::new(RwLock::new(HashMap::new()));
        let ready_clone = ready.clone();
        let tx_clone = tx.clone();
        let subscriptions_clone = subscriptions.clone();

        let client_shared = Arc::new(Mutex::new(client));
        let client_clone = client_shared.clone();
        let loop_handle = tokio::spawn(async move {
            run_eventloop(eventloop, client_clone, ready_clone, tx_clone, subscriptions_clone, config).await;
        });

        Ok(Self {
            client: client_shared,
            ready,
            events_tx: tx,
            subscriptions,
            _loop_handle: Arc::new(loop_handle),
        })
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    /// New receiver for connection and message events; dropping it unsubscribes.
    pub fn events(&self) -> broadcast::Receiver<MqttEvent> {
        self.events_tx.subscribe()
    }

    // The request queue only drains while connected, so never wait on it
    // with the lock held: the event loop needs the lock to restore the session.
    async fn current_client(&self) -> AsyncClient {
        self.client.lock().await.clone()
    }

    pub async fn publish<T: Into<Vec<u8>>>(&self, topic: &str, qos: QoS, retain: bool, payload: T) -> Result<(), ClientError> {
        self.current_client().await.publish(topic, qos, retain, payload).await
    }

    /// Subscribes and remembers the topic so it is restored after every reconnect.
    ///
    /// The topic stays tracked even when the request cannot be queued, since
    /// the next connect subscribes to it anyway.
    pub async fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), ClientError> {
        self.subscriptions.write().await.insert(topic.to_string(), qos);
        self.current_client().await.subscribe(topic, qos).await
    }

    pub async fn subscriptions(&self) -> Vec<String> {
        let subs = self.subscriptions.read().await;
        let mut topics: Vec<String> = subs.keys().cloned().collect();
        topics.sort();
        topics
    }

    pub async fn disconnect(&self) -> Result<(), ClientError> {
        self.ready.store(false, Ordering::Relaxed);
        self.current_client().await.disconnect().await
    }
}

fn build_options(config: &MqttConfig) -> MqttOptions {
    let mut opts = MqttOptions::new(&config.client_id, &config.host, config.port);
    opts.set_keep_alive(Duration::from_secs(config.keep_alive_secs as u64));
    opts.set_clean_session(config.clean_session);
    if let (Some(u), Some(p)) = (&config.username, &config.password) {
        opts.set_credentials(u.clone(), p.clone());
    }
    if config.use_tls {
        opts.set_transport(Transport::tls_with_default_config());
    }
    if let Some(presence) = &config.presence {
        opts.set_last_will(LastWill::new(
            presence.topic.clone(),
            presence.offline.clone(),
            QoS::AtLeastOnce,
            true,
        ));
    }
    opts.set_request_channel_capacity(64);
    opts
}

fn build_client(config: &MqttConfig) -> Result<(AsyncClient, EventLoop), ClientError> {
    Ok(AsyncClient::new(build_options(config), 64))
}

async fn run_eventloop(
    mut eventloop: EventLoop,
    client_shared: Arc<Mutex<AsyncClient>>,
    ready: Arc<AtomicBool>,
    events_tx: broadcast::Sender<MqttEvent>,
    subscriptions: Arc<RwLock<HashMap<String, QoS>>>,
    config: MqttConfig,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                info!(host = %config.host, port = config.port, "MQTT connected");
                ready.store(true, Ordering::Relaxed);
                let _ = events_tx.send(MqttEvent::Connected);

                let client = client_shared.lock().await.clone();
                let subs: Vec<(String, QoS)> = subscriptions
                    .read()
                    .await
                    .iter()
                    .map(|(topic, qos)| (topic.clone(), *qos))
                    .collect();
                // Requests made while offline may fill the queue; restoring from
                // another task keeps this loop polling so it drains.
                tokio::spawn(restore_session(client, subs, config.presence.clone()));
            }
            Ok(Event::Incoming(Incoming::Publish(p))) => {
                let topic = p.topic.to_string();
                let payload = p.payload.to_vec();
                debug!(%topic, bytes = payload.len(), "MQTT publish received");
                let _ = events_tx.send(MqttEvent::Publish { topic, payload });
            }
            Ok(Event::Incoming(Incoming::PubAck(ack))) => {
                let _ = events_tx.send(MqttEvent::PubAck(ack.pkid));
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                warn!("MQTT disconnect requested");
                ready.store(false, Ordering::Relaxed);
                let _ = events_tx.send(MqttEvent::Disconnected);
            }
            Ok(other) => {
                debug!(?other, "MQTT event");
            }
            Err(e) => {
                let delay = config.reconnect_delay;
                error!(error = ?e, ?delay, "MQTT error; will attempt reconnect");
                ready.store(false, Ordering::Relaxed);
                let _ = events_tx.send(MqttEvent::Error(e.to_string()));
                let _ = events_tx.send(MqttEvent::Disconnected);

                // Fixed delay, unbounded retries
                sleep(delay).await;

                match build_client(&config) {
                    Ok((new_client, new_eventloop)) => {
                        eventloop = new_eventloop;
                        {
                            let mut client_guard = client_shared.lock().await;
                            *client_guard = new_client;
                        }
                        info!("MQTT client and eventloop rebuilt, attempting reconnection");
                        continue;
                    }
                    Err(err) => {
                        error!(?err, "Failed to rebuild MQTT client; retrying");
                    }
                }
            }
        }
    }
}

async fn restore_session(client: AsyncClient, subs: Vec<(String, QoS)>, presence: Option<Presence>) {
    for (topic, qos) in subs {
        debug!("Restoring subscription to {}", topic);
        if let Err(err) = client.subscribe(&topic, qos).await {
            warn!(?err, "Failed to restore subscription to {}", topic);
        }
    }
    if let Some(presence) = presence {
        if let Err(err) = client.publish(&presence.topic, QoS::AtLeastOnce, true, presence.online).await {
            warn!(?err, topic = %presence.topic, "Failed to announce presence");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::{mpsc, oneshot};
    use tokio::time::{timeout, Instant};

    const CONNECT: u8 = 1;
    const PUBLISH: u8 = 3;
    const SUBSCRIBE: u8 = 8;
    const PINGREQ: u8 = 12;

    #[derive(Debug)]
    struct Packet {
        kind: u8,
        flags: u8,
        body: Vec<u8>,
    }

    impl Packet {
        fn string_at(&self, at: usize) -> (String, usize) {
            let len = u16::from_be_bytes([self.body[at], self.body[at + 1]]) as usize;
            let text = String::from_utf8_lossy(&self.body[at + 2..at + 2 + len]).into_owned();
            (text, at + 2 + len)
        }

        /// Topic of a PUBLISH, or the first filter of a SUBSCRIBE.
        fn topic(&self) -> Option<String> {
            match self.kind {
                PUBLISH => Some(self.string_at(0).0),
                SUBSCRIBE => Some(self.string_at(2).0),
                _ => None,
            }
        }

        fn retained(&self) -> bool {
            self.flags & 0x01 != 0
        }

        fn payload(&self) -> &[u8] {
            let (_, mut at) = self.string_at(0);
            if (self.flags >> 1) & 0x03 > 0 {
                at += 2;
            }
            &self.body[at..]
        }
    }

    async fn read_packet(stream: &mut TcpStream) -> std::io::Result<Packet> {
        let header = stream.read_u8().await?;
        let mut len = 0usize;
        let mut shift = 0;
        loop {
            let byte = stream.read_u8().await?;
            len |= ((byte & 0x7f) as usize) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        let mut body = vec![0; len];
        stream.read_exact(&mut body).await?;
        Ok(Packet { kind: header >> 4, flags: header & 0x0f, body })
    }

    /// Minimal broker session: CONNACK after `connack_delay`, SUBACK and
    /// PINGRESP as needed, every later packet forwarded to `seen`.
    async fn serve_session(mut stream: TcpStream, connack_delay: Duration, seen: mpsc::UnboundedSender<Packet>) {
        let Ok(connect) = read_packet(&mut stream).await else { return };
        assert_eq!(connect.kind, CONNECT);
        sleep(connack_delay).await;
        if stream.write_all(&[0x20, 0x02, 0x00, 0x00]).await.is_err() {
            return;
        }
        while let Ok(packet) = read_packet(&mut stream).await {
            let reply = match packet.kind {
                SUBSCRIBE => vec![0x90, 0x03, packet.body[0], packet.body[1], 0x00],
                PINGREQ => vec![0xd0, 0x00],
                _ => Vec::new(),
            };
            if !reply.is_empty() && stream.write_all(&reply).await.is_err() {
                break;
            }
            if seen.send(packet).is_err() {
                break;
            }
        }
    }

    fn config() -> MqttConfig {
        MqttConfig {
            host: "broker.test".to_string(),
            port: 1884,
            client_id: "haptic-test".to_string(),
            keep_alive_secs: 15,
            ..MqttConfig::default()
        }
    }

    #[test]
    fn options_follow_config() {
        let opts = build_options(&config());
        assert_eq!(opts.broker_address(), ("broker.test".to_string(), 1884));
        assert_eq!(opts.client_id(), "haptic-test");
        assert_eq!(opts.keep_alive(), Duration::from_secs(15));
        assert!(opts.last_will().is_none());
    }

    #[test]
    fn presence_registers_retained_last_will() {
        let cfg = config().with_presence(Presence::for_node("haptic", "watch-1"));
        let will = build_options(&cfg).last_will().expect("last will");
        assert_eq!(will.topic, "haptic/nodes/watch-1");
        assert_eq!(&will.message[..], b"offline");
        assert!(will.retain);
    }

    #[tokio::test]
    async fn subscriptions_are_tracked_before_connecting() {
        // nothing listens on port 1, the event loop just keeps retrying
        let cfg = MqttConfig { host: "127.0.0.1".to_string(), port: 1, ..config() };
        let service = MqttService::connect(cfg).await.unwrap();
        assert!(!service.is_ready());
        service.subscribe("Output/Vibration", QoS::AtMostOnce).await.unwrap();
        service.subscribe("Output/Direction", QoS::AtMostOnce).await.unwrap();
        assert_eq!(service.subscriptions().await, vec!["Output/Direction", "Output/Vibration"]);
    }

    #[tokio::test]
    async fn queued_publishes_do_not_block_session_restore() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (seen_tx, mut seen) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            serve_session(stream, Duration::from_millis(1500), seen_tx).await;
        });

        let cfg = MqttConfig { host: "127.0.0.1".to_string(), port, ..config() };
        let service = MqttService::connect(cfg).await.unwrap();
        service.subscribe("Command/Haptic", QoS::AtMostOnce).await.unwrap();

        // more requests than the queue holds before CONNACK arrives
        let publisher = {
            let service = service.clone();
            tokio::spawn(async move {
                for i in 0..80 {
                    service
                        .publish("Output/Vibration", QoS::AtMostOnce, false, i.to_string())
                        .await
                        .unwrap();
                }
            })
        };

        let mut published = 0;
        let mut subscribed = false;
        timeout(Duration::from_secs(10), async {
            while published < 80 || !subscribed {
                let packet = seen.recv().await.expect("broker session ended");
                match packet.kind {
                    PUBLISH => published += 1,
                    SUBSCRIBE => subscribed |= packet.topic().as_deref() == Some("Command/Haptic"),
                    _ => {}
                }
            }
        })
        .await
        .expect("queued traffic never reached the broker");

        timeout(Duration::from_secs(5), publisher).await.expect("publisher blocked").unwrap();
        assert!(service.is_ready());
    }

    #[tokio::test]
    async fn reconnects_after_fixed_delay_and_restores_session() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (seen_tx, mut seen) = mpsc::unbounded_channel();
        let (retry_tx, retry_rx) = oneshot::channel();
        tokio::spawn(async move {
            // hang up on the first attempt before CONNACK
            let (mut first, _) = listener.accept().await.unwrap();
            let _ = read_packet(&mut first).await;
            drop(first);
            let dropped_at = Instant::now();

            let (second, _) = listener.accept().await.unwrap();
            let _ = retry_tx.send(dropped_at.elapsed());
            serve_session(second, Duration::ZERO, seen_tx).await;
        });

        let cfg = MqttConfig {
            host: "127.0.0.1".to_string(),
            port,
            reconnect_delay: Duration::from_secs(1),
            ..config()
        }
        .with_presence(Presence::for_node("haptic", "watch-1"));
        let service = MqttService::connect(cfg).await.unwrap();
        let mut events = service.events();
        service.subscribe("Output/Vibration", QoS::AtMostOnce).await.unwrap();
        service.subscribe("Output/Direction", QoS::AtLeastOnce).await.unwrap();

        let gap = timeout(Duration::from_secs(10), retry_rx).await.unwrap().unwrap();
        assert!(gap >= Duration::from_secs(1), "retried after {:?}", gap);

        let mut topics = BTreeSet::new();
        let mut announced = false;
        timeout(Duration::from_secs(10), async {
            while topics.len() < 2 || !announced {
                let packet = seen.recv().await.expect("broker session ended");
                match packet.kind {
                    SUBSCRIBE => topics.extend(packet.topic()),
                    PUBLISH => {
                        announced |= packet.topic().as_deref() == Some("haptic/nodes/watch-1")
                            && packet.retained()
                            && packet.payload() == b"online";
                    }
                    _ => {}
                }
            }
        })
        .await
        .expect("session was not restored");
        assert_eq!(topics.into_iter().collect::<Vec<_>>(), vec!["Output/Direction", "Output/Vibration"]);

        let mut history = Vec::new();
        while let Ok(event) = events.try_recv() {
            history.push(event);
        }
        let down = history.iter().position(|e| matches!(e, MqttEvent::Disconnected));
        let up = history.iter().position(|e| matches!(e, MqttEvent::Connected));
        assert!(matches!((down, up), (Some(d), Some(u)) if d < u), "{:?}", history);
        assert!(service.is_ready());
    }
}
