//! Prints the content of an MCP certificate chain.

use std::{env, fs};
use mcp_trust::Certificate;


fn main() {
    let path = match env::args().nth(1) {
        Some(path) => path,
        None => {
            println!("Usage: readmcp <path>");
            return
        }
    };
    let data = match fs::read_to_string(&path) {
        Ok(data) => data,
        Err(err) => {
            println!("Can’t read file: {}", err);
            return;
        }
    };

    let chain = Certificate::from_pem_bundle(&data);
    if chain.is_empty() {
        println!("No certificates found.");
        return
    }

    for (idx, cert) in chain.iter().enumerate() {
        if idx > 0 {
            println!();
        }
        print_cert(cert);
    }
}

fn print_cert(cert: &Certificate) {
    println!("uid:         {}", cert.uid());
    if let Some(ipid) = cert.ipid() {
        println!("ipid:        {}", ipid);
    }
    println!("fingerprint: {}", cert.fingerprint());
    println!("serial:      {}", cert.serial());
    println!("valid from:  {}", cert.valid_from());
    println!("valid to:    {}", cert.valid_to());
    println!("ca:          {}", cert.is_ca());
    for (key, value) in cert.dn() {
        println!("{:<12} {}", format!("{}:", key), value);
    }
    let alt = cert.alt_names();
    let alt_names = [
        ("flagState", &alt.flag_state),
        ("callSign", &alt.call_sign),
        ("IMONumber", &alt.imo_number),
        ("MMSI", &alt.mmsi),
        ("shipType", &alt.ship_type),
        ("homePort", &alt.home_port),
        ("secondaryMRN", &alt.secondary_mrn),
        ("URL", &alt.url),
    ];
    for (name, value) in alt_names {
        if let Some(value) = value {
            println!("{:<12} {}", format!("{}:", name), value);
        }
    }
    if let Some(url) = cert.x5u_url() {
        println!("x5u:         {}", url);
    }
    if let Some(url) = cert.matp_url() {
        println!("matp:        {}", url);
    }
    if let Some(url) = cert.ocsp_url() {
        println!("ocsp:        {}", url);
    }
}
