//! Canned daemon responses.
//!
//! The configuration document contains the local node, one peer, a
//! simple-versioned repository shared with both, and an unversioned
//! read-only one. Fields the client never interprets are included so
//! write-back preservation can be checked.

use serde_json::{Value, json};

pub const LOCAL_ID: &str = "LOCAL7Q-2XDEOCN-UX5LWG3-LOCALID";
pub const PEER_ID: &str = "PEER4AB-NM6XCSD-7K2P3QR-PEERID0";
pub const VERSION: &str = "v0.8.10";

pub fn config_document() -> Value {
    json!({
        "Version": 3,
        "Repositories": [
            {
                "ID": "default",
                "Directory": "/sdcard/Sync",
                "Nodes": [
                    {"NodeID": LOCAL_ID, "Name": "", "Addresses": null},
                    {"NodeID": PEER_ID, "Name": "", "Addresses": null}
                ],
                "ReadOnly": false,
                "IgnorePerms": false,
                "Invalid": "",
                "Versioning": {"Type": "simple", "Params": {"keep": "5"}}
            },
            {
                "ID": "camera",
                "Directory": "/sdcard/DCIM",
                "Nodes": [{"NodeID": LOCAL_ID, "Name": "", "Addresses": null}],
                "ReadOnly": true,
                "IgnorePerms": false,
                "Invalid": "",
                "Versioning": {"Type": "", "Params": {}}
            }
        ],
        "Nodes": [
            {"NodeID": LOCAL_ID, "Name": "phone", "Addresses": ["dynamic"]},
            {"NodeID": PEER_ID, "Name": "laptop", "Addresses": ["tcp://192.168.1.20:22000", "dynamic"]}
        ],
        "GUI": {
            "Enabled": true,
            "Address": "127.0.0.1:8080",
            "User": "",
            "Password": "",
            "UseTLS": false,
            "APIKey": "test-key"
        },
        "Options": {
            "ListenAddress": ["0.0.0.0:22000"],
            "GlobalAnnServer": "announce.syncthing.net:22025",
            "GlobalAnnEnabled": true,
            "LocalAnnEnabled": true,
            "LocalAnnPort": 21025,
            "MaxSendKbps": 0,
            "RescanIntervalS": 60,
            "ReconnectIntervalS": 60,
            "StartBrowser": false,
            "UPnPEnabled": true,
            "URAccepted": 0
        }
    })
}

pub fn config_json() -> String {
    config_document().to_string()
}

pub fn system_document(my_id: &str) -> Value {
    json!({
        "alloc": 2_621_440,
        "cpuPercent": 1.25,
        "extAnnounceOK": true,
        "goroutines": 23,
        "myID": my_id,
        "sys": 8_388_608
    })
}

pub fn system_json() -> String {
    system_document(LOCAL_ID).to_string()
}

pub fn connections_document() -> Value {
    json!({
        "total": {
            "At": "2014-06-01T12:00:00Z",
            "InBytesTotal": 4096,
            "OutBytesTotal": 1024
        },
        PEER_ID: {
            "At": "2014-06-01T12:00:00Z",
            "InBytesTotal": 4096,
            "OutBytesTotal": 1024,
            "Address": "192.168.1.20:22000",
            "ClientVersion": "v0.8.10",
            "Completion": 100.0
        }
    })
}

pub fn connections_json() -> String {
    connections_document().to_string()
}
