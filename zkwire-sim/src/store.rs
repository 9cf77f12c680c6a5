//! In-memory terminal data
//!
//! All sessions share one [`DeviceStore`] behind a single mutex. Handlers
//! hold the lock for the duration of one request and never across an await.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{Local, NaiveDateTime};
use parking_lot::Mutex;
use zkwire_core::EventFlags;
use zkwire_types::{
    attendance::encode_attendance, template::encode_templates, user::encode_users, with_size_prefix,
    AttendanceRecord, Capacity, TemplateRecord, UserLayout, UserRecord,
};

use crate::config::SimulatorConfig;

pub type SharedStore = Arc<Mutex<DeviceStore>>;

/// Users, templates, attendance and settings of the simulated terminal
#[derive(Debug)]
pub struct DeviceStore {
    users: BTreeMap<u16, UserRecord>,
    templates: BTreeMap<(u16, u8), TemplateRecord>,
    attendance: Vec<AttendanceRecord>,
    options: HashMap<String, String>,
    clock_offset: chrono::Duration,
    enabled: bool,
    events: EventFlags,
    lcd: BTreeMap<u16, String>,
    user_layout: UserLayout,
    capacity: Capacity,
}

impl DeviceStore {
    /// A terminal with the three factory users
    pub fn seeded(config: &SimulatorConfig) -> Self {
        let profile = &config.profile;

        let mut options = HashMap::new();
        for (name, value) in [
            ("~SerialNumber", profile.serial_number.as_str()),
            ("~Platform", profile.platform.as_str()),
            ("~DeviceName", profile.device_name.as_str()),
            ("MAC", profile.mac_address.as_str()),
            ("IPAddress", config.ip.as_str()),
            ("NetMask", profile.netmask.as_str()),
            ("GATEIPAddress", profile.gateway.as_str()),
            ("ZKFaceVersion", "0"),
            ("~ZKFPVersion", "10"),
            ("~ExtendFmt", "0"),
            ("~UserExtFmt", "0"),
            ("FaceFunOn", "0"),
            ("CompatOldFirmware", "0"),
        ] {
            options.insert(name.to_string(), value.to_string());
        }

        let mut store = Self {
            users: BTreeMap::new(),
            templates: BTreeMap::new(),
            attendance: Vec::new(),
            options,
            clock_offset: chrono::Duration::zero(),
            enabled: true,
            events: EventFlags::empty(),
            lcd: BTreeMap::new(),
            user_layout: profile.user_layout,
            capacity: Capacity {
                users_cap: profile.users_cap,
                fingers_cap: profile.fingers_cap,
                records_cap: profile.records_cap,
                ..Capacity::default()
            },
        };

        store.upsert_user(UserRecord::new(1, "Admin"));
        store.upsert_user(
            UserRecord::new(2, "User001")
                .with_password("12345")
                .with_card(123456),
        );
        store.upsert_user(UserRecord::new(3, "User002").with_card(234567));
        store
    }

    pub fn shared(self) -> SharedStore {
        Arc::new(Mutex::new(self))
    }

    pub fn users(&self) -> impl Iterator<Item = &UserRecord> {
        self.users.values()
    }

    pub fn user(&self, uid: u16) -> Option<&UserRecord> {
        self.users.get(&uid)
    }

    /// Insert or replace by uid
    pub fn upsert_user(&mut self, user: UserRecord) {
        self.users.insert(user.uid, user);
    }

    /// Remove a user and every template it owns
    pub fn delete_user(&mut self, uid: u16) -> bool {
        let removed = self.users.remove(&uid).is_some();
        self.templates.retain(|&(owner, _), _| owner != uid);
        removed
    }

    pub fn templates(&self) -> impl Iterator<Item = &TemplateRecord> {
        self.templates.values()
    }

    pub fn template(&self, uid: u16, finger_index: u8) -> Option<&TemplateRecord> {
        self.templates.get(&(uid, finger_index))
    }

    pub fn upsert_template(&mut self, template: TemplateRecord) {
        self.templates
            .insert((template.uid, template.finger_index), template);
    }

    pub fn delete_template(&mut self, uid: u16, finger_index: u8) -> bool {
        self.templates.remove(&(uid, finger_index)).is_some()
    }

    pub fn attendance(&self) -> &[AttendanceRecord] {
        &self.attendance
    }

    pub fn push_attendance(&mut self, record: AttendanceRecord) {
        self.attendance.push(record);
    }

    pub fn clear_attendance(&mut self) {
        self.attendance.clear();
    }

    /// Drop users, templates and attendance
    pub fn clear_data(&mut self) {
        self.users.clear();
        self.templates.clear();
        self.attendance.clear();
    }

    /// Option value, `None` when the terminal does not know it
    pub fn option(&self, name: &str) -> Option<&str> {
        self.options.get(name).map(String::as_str)
    }

    pub fn set_option(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.options.insert(name.into(), value.into());
    }

    /// Terminal clock
    pub fn now(&self) -> NaiveDateTime {
        Local::now().naive_local() + self.clock_offset
    }

    /// Set the terminal clock; it keeps running from there
    pub fn set_time(&mut self, time: NaiveDateTime) {
        self.clock_offset = time - Local::now().naive_local();
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn events(&self) -> EventFlags {
        self.events
    }

    pub fn set_events(&mut self, events: EventFlags) {
        self.events = events;
    }

    pub fn lcd_line(&self, line: u16) -> Option<&str> {
        self.lcd.get(&line).map(String::as_str)
    }

    pub fn write_lcd(&mut self, line: u16, text: String) {
        self.lcd.insert(line, text);
    }

    pub fn clear_lcd(&mut self) {
        self.lcd.clear();
    }

    /// Counters block for CMD_GET_FREE_SIZES
    pub fn capacity(&self) -> Capacity {
        let users = self.users.len() as i32;
        let fingers = self.templates.len() as i32;
        let records = self.attendance.len() as i32;
        let cards = self.users.values().filter(|u| u.card_number != 0).count() as i32;

        Capacity {
            users,
            fingers,
            records,
            cards,
            users_available: self.capacity.users_cap - users,
            fingers_available: self.capacity.fingers_cap - fingers,
            records_available: self.capacity.records_cap - records,
            ..self.capacity
        }
    }

    /// User data set with its size prefix
    pub fn users_data(&self) -> zkwire_types::Result<Vec<u8>> {
        let users: Vec<UserRecord> = self.users.values().cloned().collect();
        Ok(with_size_prefix(&encode_users(&users, self.user_layout)?))
    }

    /// Attendance data set with its size prefix
    pub fn attendance_data(&self) -> zkwire_types::Result<Vec<u8>> {
        Ok(with_size_prefix(&encode_attendance(&self.attendance)?))
    }

    /// Template data set with its size prefix
    pub fn templates_data(&self) -> zkwire_types::Result<Vec<u8>> {
        let templates: Vec<TemplateRecord> = self.templates.values().cloned().collect();
        Ok(with_size_prefix(&encode_templates(&templates)?))
    }
}
