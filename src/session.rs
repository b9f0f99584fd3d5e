use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::sync::{mpsc, Mutex, Notify, RwLock};
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::catalog;
use crate::chunker::{chunk_frame, Reassembler};
use crate::convert::{decode_bitmap, encode_bitmap};
use crate::envelope::{Command, Envelope, Equipment, RESPONSE_OK};
use crate::error::{IfitError, ProtocolViolation, Result};
use crate::transport::Transport;
use crate::types::{EquipmentInformation, SessionConfig, SessionState, Value};

// Offsets into a validated response payload. These are the raw-frame
// offsets mapped during reverse engineering, shifted by the 7-byte envelope
// header the codec strips (firmware string at raw byte 11, reference number
// at raw 15, serial length at raw 8, feature count at raw 8, information
// bitmap at raw 16). Stable across observed firmware; if a revision moves
// them, this block is the only place to touch.
const FEATURE_COUNT_OFFSET: usize = 1;
const FIRMWARE_OFFSET: usize = 4;
const REFERENCE_OFFSET: usize = 8;
const SERIAL_LENGTH_OFFSET: usize = 1;
const INFORMATION_BITMAP_OFFSET: usize = 9;

/// How long a cancelled request keeps consuming stray response chunks
const CANCEL_DRAIN_WINDOW: Duration = Duration::from_millis(500);

/// Characteristic IDs polled by [`Session::read_current_values`]
const CURRENT_VALUE_IDS: [u8; 5] = [0, 10, 12, 16, 17];

/// Characteristic IDs of the static limits cached at initialization
const LIMIT_IDS: [u8; 6] = [27, 28, 30, 31, 36, 49];

/// The single in-flight request slot
///
/// Created once the last request chunk is written, dropped when the
/// response is fully reassembled, fails validation, or the deadline
/// expires. The reassembly buffer itself lives in the session's
/// [`Reassembler`]. The session never holds more than one of these; the
/// request mutex serializes callers in arrival order.
struct PendingRequest {
    command: Command,
    deadline: Instant,
}

impl PendingRequest {
    fn new(command: Command, timeout: Duration) -> Self {
        Self {
            command,
            deadline: Instant::now() + timeout,
        }
    }

    /// Push the deadline out after a response chunk was observed
    fn observe_chunk(&mut self, timeout: Duration) {
        self.deadline = Instant::now() + timeout;
    }

    /// Check the response envelope against this request
    ///
    /// Every response carries the request's command in its header and a
    /// status byte at the front of its payload.
    fn validate(&self, envelope: Envelope) -> Result<Response> {
        if envelope.command != self.command {
            return Err(ProtocolViolation::UnexpectedCommand {
                got: envelope.command.raw(),
                expected: self.command.raw(),
            }
            .into());
        }
        let status = *envelope
            .payload
            .first()
            .ok_or(ProtocolViolation::Truncated(0))?;
        if status != RESPONSE_OK {
            return Err(ProtocolViolation::ResponseNotOk(status).into());
        }
        Ok(Response {
            equipment: envelope.equipment,
            payload: envelope.payload,
        })
    }
}

/// A validated response: equipment echo plus payload (status byte at 0)
struct Response {
    equipment: Equipment,
    payload: Bytes,
}

/// Transport-side state guarded by the request mutex
struct Inner {
    transport: Box<dyn Transport>,
    notifications: mpsc::Receiver<Vec<u8>>,
    reassembler: Reassembler,
}

/// Request/response session with one piece of iFit equipment
///
/// The session owns the transport handles and enforces the protocol's
/// ordering rules: chunks of a request are written one at a time, at most
/// one request is in flight, and concurrent callers are served in arrival
/// order (the request mutex is fair). Pure codec work happens inline;
/// every await point is either a chunk write or the response wait.
///
/// A session starts in [`SessionState::Connected`]. Read-only operations
/// work immediately; writes require [`enable`](Self::enable) with the
/// equipment's activation code first.
pub struct Session {
    inner: Mutex<Inner>,
    state: RwLock<SessionState>,
    info: RwLock<Option<EquipmentInformation>>,
    cancel: Notify,
    config: SessionConfig,
}

impl Session {
    /// Create a session over an established, subscribed transport
    ///
    /// `notifications` must deliver TX-characteristic notifications in
    /// arrival order. [`crate::ble::connect_first`] wires this up for real
    /// hardware.
    #[must_use]
    pub fn new(
        transport: Box<dyn Transport>,
        notifications: mpsc::Receiver<Vec<u8>>,
        config: SessionConfig,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                transport,
                notifications,
                reassembler: Reassembler::new(),
            }),
            state: RwLock::new(SessionState::Connected),
            info: RwLock::new(None),
            cancel: Notify::new(),
            config,
        }
    }

    /// Session tuning knobs, including the monitor pacing interval
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current lifecycle state
    pub async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    /// Equipment metadata gathered by [`initialize`](Self::initialize)
    pub async fn equipment_info(&self) -> Option<EquipmentInformation> {
        self.info.read().await.clone()
    }

    /// Cancel the in-flight request, if any
    ///
    /// The cancelled caller receives [`IfitError::Cancelled`] after the
    /// session has consumed any lingering response chunks, keeping the
    /// notification stream aligned for the next request. A no-op when no
    /// request is outstanding.
    pub fn cancel(&self) {
        self.cancel.notify_waiters();
    }

    /// Disconnect from the equipment
    ///
    /// # Errors
    ///
    /// Returns a transport-level error if the disconnect fails; the session
    /// transitions to [`SessionState::Disconnected`] either way.
    pub async fn disconnect(&self) -> Result<()> {
        let inner = self.inner.lock().await;
        self.set_state(SessionState::Disconnected).await;
        inner.transport.disconnect().await
    }

    /// Query the characteristic IDs the equipment supports
    ///
    /// Sends `EQUIPMENT_INFORMATION` and decodes the characteristic bitmap
    /// from the response.
    ///
    /// # Errors
    ///
    /// Protocol, framing, timeout and transport errors per the session
    /// failure rules.
    pub async fn equipment_information(&self) -> Result<BTreeSet<u8>> {
        self.query_information().await.map(|(_, ids)| ids)
    }

    /// Query the capability IDs the equipment advertises
    ///
    /// # Errors
    ///
    /// Protocol, framing, timeout and transport errors per the session
    /// failure rules.
    pub async fn supported_capabilities(&self) -> Result<Vec<u8>> {
        let response = self
            .execute(Command::SupportedCapabilities, Bytes::new())
            .await?;
        Ok(parse_feature_list(&response.payload).to_vec())
    }

    /// Query the command set the equipment accepts
    ///
    /// Command bytes outside the known set are ignored (logged at debug).
    ///
    /// # Errors
    ///
    /// Protocol, framing, timeout and transport errors per the session
    /// failure rules.
    pub async fn supported_commands(&self) -> Result<BTreeSet<Command>> {
        let response = self
            .execute(Command::SupportedCommands, Bytes::new())
            .await?;
        let mut commands = BTreeSet::new();
        for &raw in parse_feature_list(&response.payload) {
            match Command::from_raw(raw) {
                Some(command) => {
                    commands.insert(command);
                }
                None => debug!(raw, "equipment reports unmapped command"),
            }
        }
        Ok(commands)
    }

    /// Query the equipment's numeric model reference
    ///
    /// # Errors
    ///
    /// [`IfitError::MalformedValue`] if the response is too short for the
    /// reference field, plus the usual session failure modes.
    pub async fn equipment_reference(&self) -> Result<u32> {
        let response = self
            .execute(Command::EquipmentReference, Bytes::from_static(&[0, 0]))
            .await?;
        let bytes = response
            .payload
            .get(REFERENCE_OFFSET..REFERENCE_OFFSET + 4)
            .ok_or_else(|| IfitError::MalformedValue {
                name: "reference",
                raw: response.payload.to_vec(),
            })?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Query the equipment's firmware version string
    ///
    /// The string sits at a fixed payload offset and runs to the first
    /// `0x00` or `0x01` byte; non-ASCII bytes are dropped.
    ///
    /// # Errors
    ///
    /// Protocol, framing, timeout and transport errors per the session
    /// failure rules.
    pub async fn equipment_firmware(&self) -> Result<String> {
        let response = self
            .execute(Command::EquipmentFirmware, Bytes::from_static(&[0, 0]))
            .await?;
        let tail = response.payload.get(FIRMWARE_OFFSET..).unwrap_or_default();
        Ok(tail
            .iter()
            .take_while(|&&b| b != 0x00 && b != 0x01)
            .filter(|b| b.is_ascii())
            .map(|&b| char::from(b))
            .collect())
    }

    /// Query the equipment's serial number string
    ///
    /// # Errors
    ///
    /// [`IfitError::MalformedValue`] if the response is shorter than its
    /// declared serial length, plus the usual session failure modes.
    pub async fn equipment_serial(&self) -> Result<String> {
        let response = self
            .execute(Command::EquipmentSerial, Bytes::from_static(&[0, 0]))
            .await?;
        let malformed = || IfitError::MalformedValue {
            name: "serial",
            raw: response.payload.to_vec(),
        };
        let length = usize::from(
            *response
                .payload
                .get(SERIAL_LENGTH_OFFSET)
                .ok_or_else(malformed)?,
        );
        let start = SERIAL_LENGTH_OFFSET + 1;
        let bytes = response
            .payload
            .get(start..start + length)
            .ok_or_else(malformed)?;
        Ok(bytes
            .iter()
            .filter(|b| b.is_ascii())
            .map(|&b| char::from(b))
            .collect::<String>()
            .trim()
            .to_string())
    }

    /// Submit the 36-byte activation code to unlock control
    ///
    /// On success the session transitions to
    /// [`SessionState::Authenticated`] and writes become available. A
    /// rejected code leaves the session connected and read-capable.
    ///
    /// # Errors
    ///
    /// [`IfitError::AuthenticationFailed`] if the equipment rejects the
    /// code, plus the usual session failure modes.
    pub async fn enable(&self, activation_code: &[u8; 36]) -> Result<()> {
        match self
            .execute(Command::Enable, Bytes::copy_from_slice(activation_code))
            .await
        {
            Ok(_) => {
                info!("activation code accepted");
                self.set_state(SessionState::Authenticated).await;
                Ok(())
            }
            Err(IfitError::Protocol(ProtocolViolation::ResponseNotOk(status))) => {
                warn!(status, "activation code rejected");
                Err(IfitError::AuthenticationFailed)
            }
            Err(error) => Err(error),
        }
    }

    /// Request sensor calibration (incline re-zeroing on treadmills)
    ///
    /// # Errors
    ///
    /// [`IfitError::NotReady`] unless the session is authenticated, plus
    /// the usual session failure modes.
    pub async fn calibrate(&self) -> Result<()> {
        self.require_authenticated().await?;
        self.execute(Command::Calibrate, Bytes::from_static(&[0]))
            .await?;
        Ok(())
    }

    /// Write characteristics and read others in one exchange
    ///
    /// The general-purpose operation behind every set/get helper. Both maps
    /// are keyed by characteristic ID; writes and reads may overlap. The
    /// request carries a write bitmap, a read bitmap and the write values
    /// in ascending ID order; the response carries the read values in
    /// ascending ID order.
    ///
    /// Writes are sent exactly as requested; the equipment ignores what it
    /// does not support. Reads the equipment did not list in its
    /// information bitmap are skipped during decode, because the response
    /// omits their values.
    ///
    /// # Errors
    ///
    /// [`IfitError::UnknownCharacteristic`] for IDs outside the catalog,
    /// [`IfitError::NotWritable`] for writes to read-only characteristics,
    /// [`IfitError::NotReady`] for writes before [`enable`](Self::enable),
    /// plus the usual session failure modes.
    pub async fn write_and_read(
        &self,
        writes: &BTreeMap<u8, Value>,
        reads: &BTreeSet<u8>,
    ) -> Result<BTreeMap<u8, Value>> {
        for &id in writes.keys() {
            let characteristic = catalog::by_id(id).ok_or(IfitError::UnknownCharacteristic(id))?;
            if !characteristic.writable {
                return Err(IfitError::NotWritable(id));
            }
        }
        for &id in reads {
            if catalog::by_id(id).is_none() {
                return Err(IfitError::UnknownCharacteristic(id));
            }
        }
        if !writes.is_empty() {
            self.require_authenticated().await?;
        }

        let supported = self
            .info
            .read()
            .await
            .as_ref()
            .map(|info| info.characteristics.clone());
        let effective_reads = filter_supported_reads(reads, supported.as_ref());

        let payload = build_write_and_read_payload(writes, &effective_reads)?;
        let response = self.execute(Command::WriteAndRead, payload).await?;
        parse_read_values(&response.payload, &effective_reads)
    }

    /// Read characteristic values by ID
    ///
    /// # Errors
    ///
    /// As for [`write_and_read`](Self::write_and_read).
    pub async fn read_characteristics<I: IntoIterator<Item = u8>>(
        &self,
        ids: I,
    ) -> Result<BTreeMap<u8, Value>> {
        self.write_and_read(&BTreeMap::new(), &ids.into_iter().collect())
            .await
    }

    /// Write characteristic values by ID
    ///
    /// # Errors
    ///
    /// As for [`write_and_read`](Self::write_and_read).
    pub async fn write_characteristics(&self, values: BTreeMap<u8, Value>) -> Result<()> {
        self.write_and_read(&values, &BTreeSet::new()).await?;
        Ok(())
    }

    /// Poll the values that change during a workout
    ///
    /// Reads target speed, current speed, current incline, pulse and mode.
    /// Permitted from [`SessionState::Connected`]; pace successive polls
    /// with [`SessionConfig::monitor_interval`].
    ///
    /// # Errors
    ///
    /// As for [`write_and_read`](Self::write_and_read).
    pub async fn read_current_values(&self) -> Result<BTreeMap<u8, Value>> {
        self.read_characteristics(CURRENT_VALUE_IDS).await
    }

    /// Set the target speed in km/h
    ///
    /// # Errors
    ///
    /// As for [`write_and_read`](Self::write_and_read);
    /// [`IfitError::ValueOutOfRange`] if `kph` is outside the encodable
    /// range.
    pub async fn set_kph(&self, kph: f64) -> Result<()> {
        info!(kph, "setting target speed");
        self.write_characteristics(BTreeMap::from([(0, Value::Double(kph))]))
            .await
    }

    /// Set the target incline in percent
    ///
    /// # Errors
    ///
    /// As for [`set_kph`](Self::set_kph).
    pub async fn set_incline(&self, percent: f64) -> Result<()> {
        info!(percent, "setting target incline");
        self.write_characteristics(BTreeMap::from([(1, Value::Double(percent))]))
            .await
    }

    /// Run the discovery sequence and cache the equipment metadata
    ///
    /// Queries the supported characteristic bitmap first (later requests
    /// address the equipment class it echoes), then capabilities, the
    /// command set, the metadata strings the equipment claims to support,
    /// and finally the static speed/incline limits. Individual metadata
    /// queries are tolerated on failure; the information query and the
    /// limits read are not.
    ///
    /// # Errors
    ///
    /// Protocol, framing, timeout and transport errors from the
    /// non-tolerated queries.
    pub async fn initialize(&self) -> Result<EquipmentInformation> {
        let (equipment, characteristics) = self.query_information().await?;
        info!(
            ?equipment,
            count = characteristics.len(),
            "equipment information loaded"
        );
        *self.info.write().await = Some(EquipmentInformation::new(equipment, characteristics));

        match self.supported_capabilities().await {
            Ok(capabilities) => self.update_info(|info| info.supported_capabilities = capabilities).await,
            Err(error) if error.is_recoverable() => warn!(%error, "capability query failed"),
            Err(error) => return Err(error),
        }
        match self.supported_commands().await {
            Ok(commands) => self.update_info(|info| info.supported_commands = commands).await,
            Err(error) if error.is_recoverable() => warn!(%error, "command query failed"),
            Err(error) => return Err(error),
        }

        let commands = self
            .info
            .read()
            .await
            .as_ref()
            .map(|info| info.supported_commands.clone())
            .unwrap_or_default();

        if commands.contains(&Command::EquipmentReference) {
            match self.equipment_reference().await {
                Ok(reference) => {
                    info!(reference, "equipment reference");
                    self.update_info(|info| info.reference_number = Some(reference)).await;
                }
                Err(error) if error.is_recoverable() => warn!(%error, "reference query failed"),
                Err(error) => return Err(error),
            }
        }
        if commands.contains(&Command::EquipmentFirmware) {
            match self.equipment_firmware().await {
                Ok(firmware) if !firmware.is_empty() => {
                    info!(firmware, "equipment firmware");
                    self.update_info(|info| info.firmware_version = Some(firmware)).await;
                }
                Ok(_) => {}
                Err(error) if error.is_recoverable() => warn!(%error, "firmware query failed"),
                Err(error) => return Err(error),
            }
        }
        if commands.contains(&Command::EquipmentSerial) {
            match self.equipment_serial().await {
                Ok(serial) if !serial.is_empty() => {
                    info!(serial, "equipment serial");
                    self.update_info(|info| info.serial_number = Some(serial)).await;
                }
                Ok(_) => {}
                Err(error) if error.is_recoverable() => warn!(%error, "serial query failed"),
                Err(error) => return Err(error),
            }
        }

        let limits = self.read_characteristics(LIMIT_IDS).await?;
        self.update_info(|info| info.values.extend(limits)).await;

        self.info.read().await.clone().ok_or_else(|| IfitError::NotReady {
            reason: "initialization state lost".to_string(),
        })
    }

    /// `EQUIPMENT_INFORMATION` round trip: equipment echo plus bitmap
    async fn query_information(&self) -> Result<(Equipment, BTreeSet<u8>)> {
        let response = self
            .execute(Command::EquipmentInformation, Bytes::new())
            .await?;
        let bitmap = response
            .payload
            .get(INFORMATION_BITMAP_OFFSET..)
            .ok_or_else(|| IfitError::MalformedValue {
                name: "information",
                raw: response.payload.to_vec(),
            })?;
        let (ids, _) = decode_bitmap(bitmap)?;
        Ok((response.equipment, ids))
    }

    /// Send one request and await its validated response
    ///
    /// Callers queue on the request mutex in arrival order; at most one
    /// request is ever in flight. Chunks are written one at a time with the
    /// configured gap between them. The response deadline starts when the
    /// last chunk is written and is pushed out each time a response chunk
    /// arrives.
    async fn execute(&self, command: Command, payload: Bytes) -> Result<Response> {
        let mut inner = self.inner.lock().await;

        if self.state().await == SessionState::Disconnected {
            return Err(IfitError::NotReady {
                reason: "session disconnected".to_string(),
            });
        }

        // Unsolicited chunks from a previous exchange would desynchronize
        // this response; drop them before writing
        inner.reassembler.reset();
        while let Ok(stale) = inner.notifications.try_recv() {
            debug!(len = stale.len(), "dropping stale notification chunk");
        }

        let equipment = self.request_equipment().await;
        let envelope = Envelope::new(equipment, command, payload);
        let frame = envelope.encode()?;
        let chunks = chunk_frame(&frame)?;
        debug!(
            command = ?command,
            frame_len = frame.len(),
            chunks = chunks.len(),
            "sending request"
        );

        for (index, chunk) in chunks.iter().enumerate() {
            if index > 0 && !self.config.write_gap.is_zero() {
                sleep(self.config.write_gap).await;
            }
            if let Err(error) = inner.transport.write_chunk(chunk).await {
                if inner.transport.is_connected().await {
                    return Err(error);
                }
                self.set_state(SessionState::Disconnected).await;
                return Err(IfitError::TransportLost);
            }
        }

        let mut pending = PendingRequest::new(command, self.config.response_timeout);
        let cancelled = self.cancel.notified();
        tokio::pin!(cancelled);

        loop {
            tokio::select! {
                () = &mut cancelled => {
                    debug!(command = ?command, "request cancelled");
                    Self::drain_cancelled(&mut inner).await;
                    return Err(IfitError::Cancelled);
                }
                received = timeout_at(pending.deadline, inner.notifications.recv()) => {
                    match received {
                        Err(_) => {
                            inner.reassembler.reset();
                            return Err(IfitError::Timeout {
                                timeout: self.config.response_timeout,
                            });
                        }
                        Ok(None) => {
                            self.set_state(SessionState::Disconnected).await;
                            return Err(IfitError::TransportLost);
                        }
                        Ok(Some(chunk)) => {
                            pending.observe_chunk(self.config.response_timeout);
                            if let Some(frame) = inner.reassembler.accept(&chunk)? {
                                let envelope = Envelope::decode(&frame)?;
                                return pending.validate(envelope);
                            }
                        }
                    }
                }
            }
        }
    }

    /// Consume stray chunks of an abandoned response
    ///
    /// Keeps the notification stream aligned so the next request does not
    /// see the tail of this one. Stops at a complete (discarded) frame, a
    /// framing error, or a quiet gap.
    async fn drain_cancelled(inner: &mut Inner) {
        let drain_deadline = Instant::now() + CANCEL_DRAIN_WINDOW;
        while let Ok(Some(chunk)) = timeout_at(drain_deadline, inner.notifications.recv()).await {
            match inner.reassembler.accept(&chunk) {
                Ok(Some(frame)) => {
                    debug!(len = frame.len(), "discarded response of cancelled request");
                    break;
                }
                Ok(None) => {}
                Err(_) => break,
            }
        }
        inner.reassembler.reset();
    }

    /// Equipment class for outbound requests
    ///
    /// The class learned at initialization, except that parse-only echo
    /// values are never emitted back; before initialization, `GENERAL`.
    async fn request_equipment(&self) -> Equipment {
        match self.info.read().await.as_ref().map(|info| info.equipment) {
            Some(equipment @ (Equipment::General | Equipment::Treadmill)) => equipment,
            _ => Equipment::General,
        }
    }

    async fn require_authenticated(&self) -> Result<()> {
        if self.state().await == SessionState::Authenticated {
            Ok(())
        } else {
            Err(IfitError::NotReady {
                reason: "writes require the activation code; call enable() first".to_string(),
            })
        }
    }

    async fn set_state(&self, state: SessionState) {
        *self.state.write().await = state;
    }

    async fn update_info<F: FnOnce(&mut EquipmentInformation)>(&self, apply: F) {
        if let Some(info) = self.info.write().await.as_mut() {
            apply(info);
        }
    }
}

/// Feature-list responses: count byte, then that many ID bytes
///
/// Short responses are clamped to the bytes present, as observed consoles
/// occasionally under-fill the list.
fn parse_feature_list(payload: &[u8]) -> &[u8] {
    let Some(&count) = payload.get(FEATURE_COUNT_OFFSET) else {
        return &[];
    };
    let start = FEATURE_COUNT_OFFSET + 1;
    let end = (start + usize::from(count)).min(payload.len());
    &payload[start..end]
}

/// Build a `WRITE_AND_READ` payload: write bitmap, read bitmap, write
/// values in ascending ID order
fn build_write_and_read_payload(
    writes: &BTreeMap<u8, Value>,
    reads: &BTreeSet<u8>,
) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    buf.extend_from_slice(&encode_bitmap(writes.keys().copied()));
    buf.extend_from_slice(&encode_bitmap(reads.iter().copied()));
    for (&id, value) in writes {
        let characteristic = catalog::by_id(id).ok_or(IfitError::UnknownCharacteristic(id))?;
        characteristic.converter.encode(value, &mut buf)?;
    }
    Ok(buf.freeze())
}

/// Decode the read values of a `WRITE_AND_READ` response
///
/// Values follow the status byte in ascending ID order, each occupying its
/// converter's width. Trailing padding after the last value is ignored.
fn parse_read_values(payload: &[u8], reads: &BTreeSet<u8>) -> Result<BTreeMap<u8, Value>> {
    let mut values = BTreeMap::new();
    let mut pos = 1;
    for &id in reads {
        let characteristic = catalog::by_id(id).ok_or(IfitError::UnknownCharacteristic(id))?;
        let (value, consumed) = characteristic
            .converter
            .decode(payload.get(pos..).unwrap_or_default())?;
        values.insert(id, value);
        pos += consumed;
    }
    if pos < payload.len() {
        debug!(extra = payload.len() - pos, "response carries trailing padding");
    }
    Ok(values)
}

/// Drop reads the equipment did not claim support for
///
/// The response carries no value for an unsupported characteristic, so the
/// decoder must not expect one. Writes are never filtered here.
fn filter_supported_reads(reads: &BTreeSet<u8>, supported: Option<&BTreeSet<u8>>) -> BTreeSet<u8> {
    let Some(supported) = supported else {
        return reads.clone();
    };
    for id in reads.difference(supported) {
        debug!(id, "skipping read of unsupported characteristic");
    }
    reads.intersection(supported).copied().collect()
}
