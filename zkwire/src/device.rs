//! High-level device interface

use std::time::Duration;

use byteorder::{ByteOrder, LittleEndian};
use bytes::Bytes;
use chrono::NaiveDateTime;
use tracing::{debug, info, warn};

use zkwire_core::{
    constants::data_types::{FCT_ATTLOG, FCT_FINGERTMP, FCT_USER},
    Command, EventFlags, Session, TransportKind,
};
use zkwire_transport::{probe, TcpTransport, Transport, UdpTransport};
use zkwire_types::{
    attendance::decode_attendance,
    device_info::parse_option,
    strip_size_prefix,
    template::{decode_template, decode_templates},
    time::{decode_time_bytes, encode_time_bytes},
    user::decode_users,
    AttendanceRecord, Capacity, DeviceInfo, NetworkParams, TemplateRecord, UserLayout, UserRecord,
};

use crate::config::DeviceConfig;
use crate::connection::{rejected, Connection};
use crate::error::{Error, Result};
use crate::transfer::{read_with_buffer, send_with_buffer, BufferRead};

/// How a user is identified for deletion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserRef {
    /// Internal slot number
    Uid(u16),
    /// Enrollment number
    UserId(String),
}

/// ZKTeco device
///
/// High-level interface for communicating with ZKTeco biometric devices.
///
/// # Examples
///
/// ```no_run
/// use zkwire::Device;
///
/// #[tokio::main]
/// async fn main() -> zkwire::Result<()> {
///     let mut device = Device::new("192.168.1.201", 4370);
///
///     device.connect().await?;
///     println!("Connected!");
///
///     let info = device.get_device_info().await?;
///     println!("Device: {}", info);
///
///     device.disconnect().await?;
///     Ok(())
/// }
/// ```
pub struct Device {
    conn: Connection,
    config: DeviceConfig,
    /// Transport was built from `config` and follows its changes
    managed_transport: bool,
}

impl Device {
    /// Create a new device instance (TCP transport)
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self::from_config(DeviceConfig::new(ip, port, TransportKind::Tcp))
    }

    /// Create a new device instance using UDP transport
    pub fn new_udp(ip: impl Into<String>, port: u16) -> Self {
        Self::from_config(DeviceConfig::new(ip, port, TransportKind::Udp))
    }

    /// Create a device from a validated configuration
    pub fn from_config(config: DeviceConfig) -> Self {
        let transport = transport_for(&config);
        Self {
            managed_transport: true,
            ..Self::from_transport(transport, config)
        }
    }

    /// Drive a device over a caller-supplied transport
    pub fn from_transport(transport: Box<dyn Transport>, config: DeviceConfig) -> Self {
        let conn = Connection::new(transport)
            .with_timeout(config.timeout())
            .with_max_retries(config.max_retries);
        Self {
            conn,
            config,
            managed_transport: false,
        }
    }

    /// Set reply timeout, also used for the TCP connect
    ///
    /// Takes effect for the next connection; precision is one millisecond.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self.config.timeout_ms = millis.max(1);

        if self.managed_transport && !self.conn.is_connected() {
            self.conn = Connection::new(transport_for(&self.config))
                .with_max_retries(self.config.max_retries);
        }
        self.conn = self.conn.with_timeout(self.config.timeout());
        self
    }

    /// Set CommKey password (default: 0)
    pub fn with_password(mut self, password: u32) -> Self {
        self.config.password = password;
        self
    }

    /// Set UDP retransmission limit
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.config.max_retries = max_retries;
        self.conn = self.conn.with_max_retries(max_retries);
        self
    }

    /// Set bytes requested per READ_BUFFER
    pub fn with_chunk_size(mut self, chunk_size: u32) -> Self {
        self.config.chunk_size = Some(chunk_size);
        self
    }

    /// Set the user record layout the firmware speaks
    pub fn with_user_layout(mut self, layout: UserLayout) -> Self {
        self.config.user_layout = layout;
        self
    }

    /// Skip the reachability probe on connect
    pub fn with_omit_ping(mut self, omit_ping: bool) -> Self {
        self.config.omit_ping = omit_ping;
        self
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn session(&self) -> &Session {
        self.conn.session()
    }

    /// Check if connected
    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    /// Connect to device
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Network connection fails
    /// - Device doesn't respond
    /// - Authentication required but the password is wrong
    pub async fn connect(&mut self) -> Result<()> {
        if !self.config.omit_ping {
            probe(
                &self.config.address,
                self.config.port,
                self.config.transport,
                self.config.timeout(),
            )
            .await?;
        }

        self.conn.open(self.config.password).await
    }

    /// Disconnect from device
    pub async fn disconnect(&mut self) -> Result<()> {
        self.conn.close().await
    }

    /// Check that the device still answers
    ///
    /// # Errors
    ///
    /// [`Error::ConnectionLost`] when no reply arrives; the session is
    /// closed.
    pub async fn heartbeat(&mut self) -> Result<()> {
        match self.conn.execute(Command::GetTime, Bytes::new()).await {
            Ok(_) => Ok(()),
            Err(Error::Timeout | Error::ConnectionLost) => {
                warn!("Heartbeat to {} unanswered", self.conn.remote_addr());
                self.conn.release().await;
                Err(Error::ConnectionLost)
            }
            Err(e) => Err(e),
        }
    }

    /// Get firmware version string
    pub async fn get_firmware_version(&mut self) -> Result<String> {
        let reply = self.conn.execute_ok(Command::GetVersion, Bytes::new()).await?;
        Ok(reply.payload_str())
    }

    /// Read a named device option
    ///
    /// Returns an empty string for options the device does not know.
    pub async fn get_option(&mut self, name: &str) -> Result<String> {
        let mut payload = name.as_bytes().to_vec();
        payload.push(0);

        let reply = self.conn.execute_ok(Command::OptionsRrq, payload).await?;
        let value = parse_option(&reply.payload);
        debug!("Option {} = {:?}", name, value);
        Ok(value)
    }

    /// Write a named device option
    pub async fn set_option(&mut self, name: &str, value: &str) -> Result<()> {
        let payload = format!("{name}={value}\0").into_bytes();
        self.conn.execute_ok(Command::OptionsWrq, payload).await?;
        Ok(())
    }

    /// Get device information
    ///
    /// Collects firmware, serial number, platform, name, MAC address and
    /// PIN width.
    pub async fn get_device_info(&mut self) -> Result<DeviceInfo> {
        debug!("Getting device info...");

        let firmware_version = self.get_firmware_version().await?;
        let serial_number = self.get_option("~SerialNumber").await?;

        let mut info = DeviceInfo::new(serial_number, firmware_version);
        info.platform = non_empty(self.get_option("~Platform").await?);
        info.device_name = non_empty(self.get_option("~DeviceName").await?);
        info.mac_address = non_empty(self.get_option("MAC").await?);
        info.pin_width = Some(self.get_pin_width().await?);

        debug!("Device info: {}", info);
        Ok(info)
    }

    /// Get IP address, netmask and gateway
    pub async fn get_network_params(&mut self) -> Result<NetworkParams> {
        Ok(NetworkParams {
            ip: self.get_option("IPAddress").await?,
            netmask: self.get_option("NetMask").await?,
            gateway: self.get_option("GATEIPAddress").await?,
        })
    }

    /// Width of the enrollment number field
    pub async fn get_pin_width(&mut self) -> Result<u8> {
        let reply = self.conn.execute_ok(Command::GetPinWidth, &b" P"[..]).await?;
        reply
            .payload
            .first()
            .copied()
            .ok_or_else(|| Error::InvalidResponse("empty PIN width reply".into()))
    }

    /// Read record counters and capacities
    pub async fn read_capacity(&mut self) -> Result<Capacity> {
        let reply = self.conn.execute_ok(Command::GetFreeSizes, Bytes::new()).await?;
        Ok(Capacity::decode(&reply.payload)?)
    }

    /// Read the device clock
    pub async fn get_time(&mut self) -> Result<NaiveDateTime> {
        let reply = self.conn.execute_ok(Command::GetTime, Bytes::new()).await?;
        Ok(decode_time_bytes(&reply.payload)?)
    }

    /// Set the device clock
    pub async fn set_time(&mut self, time: &NaiveDateTime) -> Result<()> {
        info!("Setting device time to {}", time);
        self.conn
            .execute_ok(Command::SetTime, encode_time_bytes(time).to_vec())
            .await?;
        Ok(())
    }

    /// Download all users
    pub async fn list_users(&mut self) -> Result<Vec<UserRecord>> {
        let data = self.read_data_set(Command::UserTempRrq, FCT_USER).await?;
        let users = decode_users(data_set_body(&data)?, self.config.user_layout)?;
        info!("Read {} users", users.len());
        Ok(users)
    }

    /// Download the attendance log
    pub async fn list_attendance(&mut self) -> Result<Vec<AttendanceRecord>> {
        let data = self.read_data_set(Command::AttLogRrq, FCT_ATTLOG).await?;
        let records = decode_attendance(data_set_body(&data)?)?;
        info!("Read {} attendance records", records.len());
        Ok(records)
    }

    /// Download all fingerprint templates
    pub async fn list_templates(&mut self) -> Result<Vec<TemplateRecord>> {
        let data = self.read_data_set(Command::DbRrq, FCT_FINGERTMP).await?;
        let templates = decode_templates(data_set_body(&data)?)?;
        info!("Read {} templates", templates.len());
        Ok(templates)
    }

    /// Fetch one template, `None` if the slot is empty
    pub async fn get_user_template(
        &mut self,
        uid: u16,
        finger_index: u8,
    ) -> Result<Option<TemplateRecord>> {
        let reply = self
            .conn
            .execute(Command::GetUserTemp, uid_finger_payload(uid, finger_index))
            .await?;

        match reply.kind() {
            Some(Command::Data) => Ok(Some(decode_template(&reply.payload)?.0)),
            Some(Command::AckError) => Ok(None),
            _ => Err(rejected(Command::GetUserTemp, &reply)),
        }
    }

    /// Create or overwrite a user
    pub async fn add_user(&mut self, user: &UserRecord) -> Result<()> {
        let record = user.encode(self.config.user_layout)?;
        self.conn.execute_ok(Command::UserWrq, record).await?;
        info!("Saved user {}", user);
        Ok(())
    }

    /// Delete a user and its templates
    pub async fn delete_user(&mut self, user: UserRef) -> Result<()> {
        let uid = match user {
            UserRef::Uid(uid) => uid,
            UserRef::UserId(user_id) => {
                let users = self.list_users().await?;
                users
                    .iter()
                    .find(|u| u.user_id == user_id)
                    .map(|u| u.uid)
                    .ok_or_else(|| Error::Device {
                        command: Command::DeleteUser,
                        reason: format!("no user with id {user_id}"),
                    })?
            }
        };

        self.conn
            .execute_ok(Command::DeleteUser, uid.to_le_bytes().to_vec())
            .await?;
        info!("Deleted user uid={}", uid);
        Ok(())
    }

    /// Upload a user together with its fingerprint templates
    pub async fn save_user_templates(
        &mut self,
        user: &UserRecord,
        templates: &[TemplateRecord],
    ) -> Result<()> {
        let bundle = template_bundle(user, templates, self.config.user_layout)?;
        debug!(
            uid = user.uid,
            templates = templates.len(),
            size = bundle.len(),
            "Uploading user with templates"
        );

        send_with_buffer(&mut self.conn, &bundle).await?;

        let mut params = [0u8; 8];
        LittleEndian::write_u32(&mut params[0..4], 12);
        LittleEndian::write_u16(&mut params[4..6], 0);
        LittleEndian::write_u16(&mut params[6..8], 8);
        self.conn
            .execute_ok(Command::SaveUserTemps, params.to_vec())
            .await?;

        self.refresh_data().await
    }

    /// Delete one fingerprint template
    pub async fn delete_template(&mut self, uid: u16, finger_index: u8) -> Result<()> {
        self.conn
            .execute_ok(Command::DeleteUserTemp, uid_finger_payload(uid, finger_index))
            .await?;
        Ok(())
    }

    /// Remove every attendance record
    pub async fn clear_attendance(&mut self) -> Result<()> {
        warn!("Clearing attendance log...");
        self.conn.execute_ok(Command::ClearAttLog, Bytes::new()).await?;
        Ok(())
    }

    /// Remove users, templates and attendance
    pub async fn clear_data(&mut self) -> Result<()> {
        warn!("Clearing all device data...");
        self.conn.execute_ok(Command::ClearData, Bytes::new()).await?;
        Ok(())
    }

    /// Enable device (normal operation mode)
    pub async fn enable_device(&mut self) -> Result<()> {
        debug!("Enabling device...");
        self.conn.execute_ok(Command::EnableDevice, Bytes::new()).await?;
        Ok(())
    }

    /// Disable device (show "Working..." on LCD)
    pub async fn disable_device(&mut self) -> Result<()> {
        debug!("Disabling device...");
        self.conn.execute_ok(Command::DisableDevice, Bytes::new()).await?;
        Ok(())
    }

    /// Restart device
    ///
    /// The session ends; reconnect once the device is back.
    pub async fn restart(&mut self) -> Result<()> {
        warn!("Restarting device...");
        self.conn.execute_ok(Command::Restart, Bytes::new()).await?;
        self.conn.release().await;
        Ok(())
    }

    /// Power off device
    pub async fn power_off(&mut self) -> Result<()> {
        warn!("Powering off device...");
        self.conn.execute_ok(Command::PowerOff, Bytes::new()).await?;
        self.conn.release().await;
        Ok(())
    }

    /// Show text on an LCD line
    pub async fn write_lcd(&mut self, line: u16, text: &str) -> Result<()> {
        let mut payload = vec![0u8; 3];
        LittleEndian::write_u16(&mut payload[0..2], line);
        payload.push(b' ');
        payload.extend_from_slice(text.as_bytes());

        self.conn.execute_ok(Command::WriteLcd, payload).await?;
        Ok(())
    }

    /// Clear the LCD
    pub async fn clear_lcd(&mut self) -> Result<()> {
        self.conn.execute_ok(Command::ClearLcd, Bytes::new()).await?;
        Ok(())
    }

    /// Open the door relay for `duration` (0.1 s resolution)
    pub async fn unlock_door(&mut self, duration: Duration) -> Result<()> {
        let tenths = u32::try_from(duration.as_millis() / 100).unwrap_or(u32::MAX);
        info!("Unlocking door for {:?}", duration);
        self.conn
            .execute_ok(Command::Unlock, tenths.to_le_bytes().to_vec())
            .await?;
        Ok(())
    }

    /// Play a built-in voice prompt
    pub async fn test_voice(&mut self, index: u32) -> Result<()> {
        self.conn
            .execute_ok(Command::TestVoice, index.to_le_bytes().to_vec())
            .await?;
        Ok(())
    }

    /// Ask the device to reload its data tables
    pub async fn refresh_data(&mut self) -> Result<()> {
        self.conn.execute_ok(Command::RefreshData, Bytes::new()).await?;
        Ok(())
    }

    /// Subscribe to real-time events
    pub async fn register_events(&mut self, flags: EventFlags) -> Result<()> {
        self.conn
            .execute_ok(Command::RegEvent, flags.bits().to_le_bytes().to_vec())
            .await?;
        Ok(())
    }

    /// Put the device back into verification mode
    pub async fn start_verify(&mut self) -> Result<()> {
        self.conn.execute_ok(Command::StartVerify, Bytes::new()).await?;
        Ok(())
    }

    async fn read_data_set(&mut self, command: Command, fct: u8) -> Result<Bytes> {
        let read = BufferRead::new(command, fct, self.config.effective_chunk_size())
            .with_max_retries(self.config.max_retries);
        read_with_buffer(&mut self.conn, read).await
    }
}

fn transport_for(config: &DeviceConfig) -> Box<dyn Transport> {
    match config.transport {
        TransportKind::Tcp => Box::new(
            TcpTransport::new(config.address.clone(), config.port)
                .with_connect_timeout(config.timeout()),
        ),
        TransportKind::Udp => Box::new(UdpTransport::new(config.address.clone(), config.port)),
    }
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

/// Body of a data set; a device with nothing to report may send no bytes
fn data_set_body(data: &[u8]) -> Result<&[u8]> {
    if data.is_empty() {
        return Ok(data);
    }
    Ok(strip_size_prefix(data)?)
}

fn uid_finger_payload(uid: u16, finger_index: u8) -> Vec<u8> {
    let mut payload = uid.to_le_bytes().to_vec();
    payload.push(finger_index);
    payload
}

/// Build the `[sizes][users][table][templates]` upload for SAVE_USERTEMPS
fn template_bundle(
    user: &UserRecord,
    templates: &[TemplateRecord],
    layout: UserLayout,
) -> Result<Vec<u8>> {
    let upack = user.encode(layout)?;

    let mut table = Vec::with_capacity(templates.len() * 8);
    let mut fpack = Vec::new();
    for template in templates {
        let tstart = u32::try_from(fpack.len())
            .map_err(|_| Error::Transfer("template bundle too large".into()))?;
        table.push(2u8);
        table.extend_from_slice(&user.uid.to_le_bytes());
        table.push(0x10 + template.finger_index);
        table.extend_from_slice(&tstart.to_le_bytes());
        fpack.extend_from_slice(&template.template);
    }

    let mut bundle = Vec::with_capacity(12 + upack.len() + table.len() + fpack.len());
    for part in [&upack, &table, &fpack] {
        bundle.extend_from_slice(&(part.len() as u32).to_le_bytes());
    }
    bundle.extend_from_slice(&upack);
    bundle.extend_from_slice(&table);
    bundle.extend_from_slice(&fpack);
    Ok(bundle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_device_create() {
        let device = Device::new("192.168.1.201", 4370);
        assert!(!device.is_connected());
        assert_eq!(device.config().transport, TransportKind::Tcp);

        let device = Device::new_udp("192.168.1.201", 4370).with_max_retries(5);
        assert_eq!(device.config().transport, TransportKind::Udp);
        assert_eq!(device.config().max_retries, 5);
    }

    #[test]
    fn test_sub_second_timeout_is_kept() {
        let device = Device::new("192.168.1.201", 4370).with_timeout(Duration::from_millis(250));

        assert_eq!(device.config().timeout_ms, 250);
        assert_eq!(device.config().timeout(), Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_operations_require_connection() {
        let mut device = Device::new("127.0.0.1", 4370);

        assert!(matches!(device.list_users().await, Err(Error::NotConnected)));
        assert!(matches!(device.enable_device().await, Err(Error::NotConnected)));
    }

    #[test]
    fn test_template_bundle_layout() {
        let user = UserRecord::new(7, "Ann");
        let templates = vec![
            TemplateRecord::new(7, 0, vec![1u8; 10]).unwrap(),
            TemplateRecord::new(7, 3, vec![2u8; 4]).unwrap(),
        ];

        let bundle = template_bundle(&user, &templates, UserLayout::Extended).unwrap();

        assert_eq!(&bundle[0..4], &72u32.to_le_bytes());
        assert_eq!(&bundle[4..8], &16u32.to_le_bytes());
        assert_eq!(&bundle[8..12], &14u32.to_le_bytes());

        let table = &bundle[12 + 72..12 + 72 + 16];
        assert_eq!(table[0], 2);
        assert_eq!(&table[1..3], &7u16.to_le_bytes());
        assert_eq!(table[3], 0x10);
        assert_eq!(&table[4..8], &0u32.to_le_bytes());
        assert_eq!(table[11], 0x13);
        assert_eq!(&table[12..16], &10u32.to_le_bytes());
        assert_eq!(bundle.len(), 12 + 72 + 16 + 14);
    }

    #[test]
    fn test_empty_data_set() {
        assert!(data_set_body(&[]).unwrap().is_empty());
        assert_eq!(data_set_body(&[1, 0, 0, 0, 9]).unwrap(), &[9]);
        assert!(data_set_body(&[1, 0]).is_err());
    }
}
