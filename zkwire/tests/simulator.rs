//! Client against the simulated terminal over real sockets

use std::net::SocketAddr;
use std::time::Duration;

use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use zkwire::{
    AttendanceRecord, Command, Device, Error, EventFlags, Packet, PunchType, SessionState,
    TemplateRecord, TransportKind, UserRecord, UserRef, VerifyMode,
};
use zkwire_sim::{SharedStore, Simulator, SimulatorConfig};
use zkwire_transport::{TcpTransport, Transport};

fn local(transport: TransportKind) -> SimulatorConfig {
    SimulatorConfig {
        ip: "127.0.0.1".to_string(),
        port: 0,
        transport,
        ..SimulatorConfig::default()
    }
}

async fn start(config: SimulatorConfig) -> (SocketAddr, SharedStore) {
    let simulator = Simulator::bind(config).await.unwrap();
    let addr = simulator.local_addr().unwrap();
    let store = simulator.store();
    tokio::spawn(simulator.run());
    (addr, store)
}

fn device(addr: SocketAddr, transport: TransportKind) -> Device {
    let device = match transport {
        TransportKind::Tcp => Device::new(addr.ip().to_string(), addr.port()),
        TransportKind::Udp => Device::new_udp(addr.ip().to_string(), addr.port()),
    };
    device.with_timeout(Duration::from_secs(2))
}

#[tokio::test]
async fn test_tcp_connect_and_disconnect() {
    let (addr, _) = start(local(TransportKind::Tcp)).await;
    let mut device = device(addr, TransportKind::Tcp);

    device.connect().await.unwrap();

    assert_eq!(device.session().state(), SessionState::Connected);
    assert_ne!(device.session().session_id(), 0);
    assert_eq!(device.session().reply_counter(), 1);
    assert_eq!(device.get_firmware_version().await.unwrap(), "Ver 6.60 Nov 13 2019");

    device.disconnect().await.unwrap();
    assert!(!device.is_connected());
    assert_eq!(device.session().state(), SessionState::Disconnected);
}

#[tokio::test]
async fn test_udp_lists_seeded_users() {
    let (addr, _) = start(local(TransportKind::Udp)).await;
    let mut device = device(addr, TransportKind::Udp);

    device.connect().await.unwrap();
    let users = device.list_users().await.unwrap();

    let names: Vec<&str> = users.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, vec!["Admin", "User001", "User002"]);
    assert_eq!(users[1].password, "12345");
    assert_eq!(users[1].card_number, 123456);
    assert_eq!(users[2].card_number, 234567);

    device.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_password_authentication() {
    let config = SimulatorConfig {
        password: 1234,
        ..local(TransportKind::Tcp)
    };
    let (addr, _) = start(config).await;

    let mut device = device(addr, TransportKind::Tcp).with_password(1234);
    device.connect().await.unwrap();
    assert!(device.session().is_authenticated());
    assert_eq!(device.list_users().await.unwrap().len(), 3);
    device.disconnect().await.unwrap();

    let mut intruder = self::device(addr, TransportKind::Tcp).with_password(4321);
    let result = intruder.connect().await;
    assert!(matches!(result, Err(Error::Authentication(_))));
    assert!(!intruder.is_connected());
}

#[tokio::test]
async fn test_missing_password_is_rejected() {
    let config = SimulatorConfig {
        password: 1234,
        ..local(TransportKind::Udp)
    };
    let (addr, _) = start(config).await;

    let mut device = device(addr, TransportKind::Udp);
    assert!(matches!(device.connect().await, Err(Error::Authentication(_))));
}

#[tokio::test]
async fn test_add_and_delete_user() {
    let (addr, store) = start(local(TransportKind::Tcp)).await;
    let mut device = device(addr, TransportKind::Tcp);
    device.connect().await.unwrap();

    let frank = UserRecord::new(10, "Frank").with_card(555).with_password("99");
    device.add_user(&frank).await.unwrap();
    assert_eq!(store.lock().user(10).map(|u| u.name.clone()), Some("Frank".to_string()));
    assert_eq!(device.list_users().await.unwrap().len(), 4);

    device.delete_user(UserRef::UserId("10".to_string())).await.unwrap();
    assert!(store.lock().user(10).is_none());

    let missing = device.delete_user(UserRef::Uid(99)).await;
    assert!(matches!(
        missing,
        Err(Error::Device {
            command: Command::DeleteUser,
            ..
        })
    ));
    assert!(device.is_connected());

    device.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_attendance_log() {
    let (addr, store) = start(local(TransportKind::Udp)).await;
    let punched = NaiveDate::from_ymd_opt(2024, 3, 15)
        .unwrap()
        .and_hms_opt(8, 30, 0)
        .unwrap();
    let records = vec![
        AttendanceRecord {
            uid: 2,
            user_id: "2".to_string(),
            timestamp: punched,
            status: VerifyMode::Card,
            punch: PunchType::CheckIn,
        },
        AttendanceRecord {
            uid: 3,
            user_id: "3".to_string(),
            timestamp: punched + chrono::Duration::hours(9),
            status: VerifyMode::Fingerprint,
            punch: PunchType::CheckOut,
        },
    ];
    for record in &records {
        store.lock().push_attendance(record.clone());
    }

    let mut device = device(addr, TransportKind::Udp);
    device.connect().await.unwrap();

    assert_eq!(device.list_attendance().await.unwrap(), records);
    assert_eq!(device.read_capacity().await.unwrap().records, 2);

    device.clear_attendance().await.unwrap();
    assert!(device.list_attendance().await.unwrap().is_empty());

    device.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_chunked_read_over_tcp() {
    let config = SimulatorConfig {
        inline_limit: 0,
        data_frame_size: 40,
        ..local(TransportKind::Tcp)
    };
    let (addr, _) = start(config).await;

    let mut device = device(addr, TransportKind::Tcp).with_chunk_size(64);
    device.connect().await.unwrap();

    let users = device.list_users().await.unwrap();
    assert_eq!(users.iter().map(|u| u.uid).collect::<Vec<_>>(), vec![1, 2, 3]);

    // the buffer was freed, a second read starts over
    assert_eq!(device.list_users().await.unwrap(), users);
    device.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_chunked_read_over_udp() {
    let config = SimulatorConfig {
        inline_limit: 0,
        ..local(TransportKind::Udp)
    };
    let (addr, _) = start(config).await;

    let mut device = device(addr, TransportKind::Udp).with_chunk_size(50);
    device.connect().await.unwrap();

    assert_eq!(device.list_users().await.unwrap().len(), 3);
    device.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_upload_user_with_templates() {
    let (addr, store) = start(local(TransportKind::Tcp)).await;
    let mut device = device(addr, TransportKind::Tcp);
    device.connect().await.unwrap();

    let user = UserRecord::new(20, "Grace");
    let templates = vec![
        TemplateRecord::new(20, 0, vec![0xA1; 600]).unwrap(),
        TemplateRecord::new(20, 4, vec![0xB2; 600]).unwrap(),
    ];
    device.save_user_templates(&user, &templates).await.unwrap();

    assert_eq!(store.lock().user(20).map(|u| u.name.clone()), Some("Grace".to_string()));

    let fetched = device.get_user_template(20, 4).await.unwrap().unwrap();
    assert_eq!(fetched.finger_index, 4);
    assert_eq!(fetched.template, vec![0xB2; 600]);
    assert!(device.get_user_template(20, 7).await.unwrap().is_none());

    let all = device.list_templates().await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].template, vec![0xA1; 600]);

    let capacity = device.read_capacity().await.unwrap();
    assert_eq!(capacity.users, 4);
    assert_eq!(capacity.fingers, 2);

    device.delete_template(20, 0).await.unwrap();
    assert!(device.get_user_template(20, 0).await.unwrap().is_none());

    device.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_device_info_and_options() {
    let (addr, _) = start(local(TransportKind::Tcp)).await;
    let mut device = device(addr, TransportKind::Tcp);
    device.connect().await.unwrap();

    let info = device.get_device_info().await.unwrap();
    assert_eq!(info.serial_number, "DGD9190019050335743");
    assert_eq!(info.platform.as_deref(), Some("ZEM560"));
    assert_eq!(info.pin_width, Some(5));

    let network = device.get_network_params().await.unwrap();
    assert_eq!(network.ip, "127.0.0.1");
    assert_eq!(network.netmask, "255.255.255.0");

    device.set_option("~DeviceName", "Lobby").await.unwrap();
    assert_eq!(device.get_option("~DeviceName").await.unwrap(), "Lobby");
    assert_eq!(device.get_option("NoSuchOption").await.unwrap(), "");

    device.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_device_control() {
    let (addr, store) = start(local(TransportKind::Udp)).await;
    let mut device = device(addr, TransportKind::Udp);
    device.connect().await.unwrap();

    device.disable_device().await.unwrap();
    assert!(!store.lock().is_enabled());
    device.enable_device().await.unwrap();
    assert!(store.lock().is_enabled());

    device.write_lcd(1, "Hello").await.unwrap();
    assert_eq!(store.lock().lcd_line(1), Some("Hello"));
    device.clear_lcd().await.unwrap();
    assert_eq!(store.lock().lcd_line(1), None);

    let target = NaiveDate::from_ymd_opt(2021, 6, 1)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap();
    device.set_time(&target).await.unwrap();
    let drift = device.get_time().await.unwrap() - target;
    assert!(drift >= chrono::Duration::zero() && drift < chrono::Duration::seconds(5));

    device.register_events(EventFlags::ATTLOG | EventFlags::UNLOCK).await.unwrap();
    assert_eq!(store.lock().events(), EventFlags::ATTLOG | EventFlags::UNLOCK);

    device.unlock_door(Duration::from_secs(3)).await.unwrap();
    device.test_voice(0).await.unwrap();
    device.refresh_data().await.unwrap();
    device.start_verify().await.unwrap();
    device.heartbeat().await.unwrap();

    device.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_restart_ends_session() {
    let (addr, _) = start(local(TransportKind::Tcp)).await;
    let mut device = device(addr, TransportKind::Tcp);
    device.connect().await.unwrap();
    let first = device.session().session_id();

    device.restart().await.unwrap();
    assert!(!device.is_connected());

    device.connect().await.unwrap();
    assert_ne!(device.session().session_id(), first);
    device.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_unknown_command_gets_error_reply() {
    let (addr, _) = start(local(TransportKind::Tcp)).await;
    let mut wire = TcpTransport::new(addr.ip().to_string(), addr.port());
    wire.connect().await.unwrap();

    wire.send(&Packet::new(Command::Connect, 0, 0).encode()).await.unwrap();
    let connected = Packet::decode(wire.receive(Duration::from_secs(2)).await.unwrap()).unwrap();
    let session_id = connected.session_id;

    wire.send(&Packet::new(9999u16, session_id, 1).encode()).await.unwrap();
    let reply = Packet::decode(wire.receive(Duration::from_secs(2)).await.unwrap()).unwrap();

    assert_eq!(reply.kind(), Some(Command::AckError));
    assert_eq!(reply.session_id, session_id);
    assert_eq!(reply.reply_id, 1);

    // the session is still usable
    wire.send(&Packet::new(Command::GetVersion, session_id, 2).encode()).await.unwrap();
    let version = Packet::decode(wire.receive(Duration::from_secs(2)).await.unwrap()).unwrap();
    assert_eq!(version.kind(), Some(Command::AckOk));
}
