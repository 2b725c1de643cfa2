//! Minimal read-only S7 client.
//!
//! Speaks just enough of the protocol stack (TPKT framing, COTP class-0
//! connection, S7 communication setup, read-var) to pull REAL values out
//! of a data block. Values arrive in the controller's native big-endian
//! layout. One client owns one TCP connection; dropping the client closes
//! the socket on every exit path, including mid-sample failures.

use linecheck_common::PlcSettings;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time;
use tracing::debug;

#[derive(Debug, Error)]
pub enum PlcError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("timed out waiting for the controller")]
    Timeout,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

const TPKT_VERSION: u8 = 0x03;
const COTP_CONNECT_CONFIRM: u8 = 0xd0;
const COTP_DATA: u8 = 0xf0;
const S7_PROTOCOL_ID: u8 = 0x32;
const PDU_TYPE_JOB: u8 = 0x01;
const PDU_TYPE_ACK_DATA: u8 = 0x03;
const FUNC_SETUP_COMMUNICATION: u8 = 0xf0;
const FUNC_READ_VAR: u8 = 0x04;
const AREA_DATA_BLOCK: u8 = 0x84;
const TRANSPORT_SIZE_BYTE: u8 = 0x02;
const ITEM_READ_OK: u8 = 0xff;
const REQUESTED_PDU_LEN: u16 = 960;

/// Connected S7 session.
pub struct S7Client {
    stream: TcpStream,
    io_timeout: Duration,
    pdu_ref: u16,
    negotiated_pdu_len: u16,
}

impl S7Client {
    /// Connects, completes the COTP handshake and negotiates PDU size.
    pub async fn connect(plc: &PlcSettings) -> Result<Self, PlcError> {
        let addr = format!("{}:{}", plc.host, plc.port);
        let stream = time::timeout(plc.io_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| PlcError::Connect(format!("connect to {} timed out", addr)))?
            .map_err(|e| PlcError::Connect(format!("connect to {} failed: {}", addr, e)))?;

        let mut client = Self {
            stream,
            io_timeout: plc.io_timeout,
            pdu_ref: 0,
            negotiated_pdu_len: REQUESTED_PDU_LEN,
        };

        let reply = client.exchange(cotp_connect_request(plc.rack, plc.slot)).await?;
        if reply.len() < 2 || reply[1] != COTP_CONNECT_CONFIRM {
            return Err(PlcError::Protocol(
                "controller refused the COTP connection".to_string(),
            ));
        }

        let pdu_ref = client.next_ref();
        let reply = client.exchange(s7_request(pdu_ref, &setup_parameters(), &[])).await?;
        let (params, _) = parse_ack(&reply)?;
        if params.first() != Some(&FUNC_SETUP_COMMUNICATION) || params.len() < 8 {
            return Err(PlcError::Protocol(
                "unexpected communication setup response".to_string(),
            ));
        }
        client.negotiated_pdu_len = u16::from_be_bytes([params[6], params[7]]);
        debug!(
            "PLC session established with {} (PDU length {})",
            addr, client.negotiated_pdu_len
        );
        Ok(client)
    }

    /// Reads one big-endian REAL from a data block byte offset.
    pub async fn read_db_real(&mut self, db: u16, offset: u32) -> Result<f32, PlcError> {
        let bytes = self.read_db(db, offset, 4).await?;
        let raw: [u8; 4] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| PlcError::Protocol("short REAL payload".to_string()))?;
        Ok(f32::from_be_bytes(raw))
    }

    /// Reads `len` bytes from a data block byte offset.
    pub async fn read_db(&mut self, db: u16, offset: u32, len: u16) -> Result<Vec<u8>, PlcError> {
        let pdu_ref = self.next_ref();
        let reply = self
            .exchange(s7_request(pdu_ref, &read_parameters(db, offset, len), &[]))
            .await?;
        let (params, data) = parse_ack(&reply)?;
        if params.first() != Some(&FUNC_READ_VAR) {
            return Err(PlcError::Protocol("unexpected read response".to_string()));
        }
        parse_read_data(&data, len as usize)
    }

    fn next_ref(&mut self) -> u16 {
        self.pdu_ref = self.pdu_ref.wrapping_add(1);
        self.pdu_ref
    }

    /// Sends one TPKT-framed request and reads the matching reply frame.
    async fn exchange(&mut self, body: Vec<u8>) -> Result<Vec<u8>, PlcError> {
        let request = tpkt_wrap(&body);
        let io_timeout = self.io_timeout;
        let io = async {
            self.stream.write_all(&request).await?;
            let mut header = [0u8; 4];
            self.stream.read_exact(&mut header).await?;
            let total = u16::from_be_bytes([header[2], header[3]]) as usize;
            if header[0] != TPKT_VERSION || total < 5 {
                return Ok(None);
            }
            let mut reply = vec![0u8; total - 4];
            self.stream.read_exact(&mut reply).await?;
            Ok::<_, std::io::Error>(Some(reply))
        };
        match time::timeout(io_timeout, io).await {
            Ok(Ok(Some(reply))) => Ok(reply),
            Ok(Ok(None)) => Err(PlcError::Protocol("malformed TPKT header".to_string())),
            Ok(Err(e)) => Err(PlcError::Io(e)),
            Err(_) => Err(PlcError::Timeout),
        }
    }
}

fn tpkt_wrap(body: &[u8]) -> Vec<u8> {
    let total = (body.len() + 4) as u16;
    let mut frame = vec![TPKT_VERSION, 0x00];
    frame.extend_from_slice(&total.to_be_bytes());
    frame.extend_from_slice(body);
    frame
}

/// COTP class-0 connection request. The remote TSAP low byte carries the
/// rack/slot address the same way the engineering tools do.
fn cotp_connect_request(rack: u16, slot: u16) -> Vec<u8> {
    let tsap_lo = (rack * 0x20 + slot) as u8;
    vec![
        0x11, // length after this byte
        0xe0, // connection request
        0x00, 0x00, // destination reference
        0x00, 0x01, // source reference
        0x00, // class 0
        0xc0, 0x01, 0x0a, // TPDU size 1024
        0xc1, 0x02, 0x01, 0x00, // local TSAP
        0xc2, 0x02, 0x01, tsap_lo, // remote TSAP (PG session)
    ]
}

/// Wraps an S7 job PDU in a COTP data TPDU.
fn s7_request(pdu_ref: u16, parameters: &[u8], data: &[u8]) -> Vec<u8> {
    let mut frame = vec![0x02, COTP_DATA, 0x80];
    frame.push(S7_PROTOCOL_ID);
    frame.push(PDU_TYPE_JOB);
    frame.extend_from_slice(&[0x00, 0x00]); // reserved
    frame.extend_from_slice(&pdu_ref.to_be_bytes());
    frame.extend_from_slice(&(parameters.len() as u16).to_be_bytes());
    frame.extend_from_slice(&(data.len() as u16).to_be_bytes());
    frame.extend_from_slice(parameters);
    frame.extend_from_slice(data);
    frame
}

fn setup_parameters() -> Vec<u8> {
    let mut params = vec![FUNC_SETUP_COMMUNICATION, 0x00];
    params.extend_from_slice(&1u16.to_be_bytes()); // max AMQ calling
    params.extend_from_slice(&1u16.to_be_bytes()); // max AMQ called
    params.extend_from_slice(&REQUESTED_PDU_LEN.to_be_bytes());
    params
}

/// Read-var item addressing `len` bytes at a data block byte offset. The
/// any-type address field counts bits.
fn read_parameters(db: u16, offset: u32, len: u16) -> Vec<u8> {
    let bit_address = offset * 8;
    let mut params = vec![FUNC_READ_VAR, 0x01];
    params.extend_from_slice(&[0x12, 0x0a, 0x10, TRANSPORT_SIZE_BYTE]);
    params.extend_from_slice(&len.to_be_bytes());
    params.extend_from_slice(&db.to_be_bytes());
    params.push(AREA_DATA_BLOCK);
    params.extend_from_slice(&bit_address.to_be_bytes()[1..4]);
    params
}

/// Splits an ack-data frame into parameter and data bytes, rejecting
/// controller-reported errors.
fn parse_ack(frame: &[u8]) -> Result<(Vec<u8>, Vec<u8>), PlcError> {
    // 3 bytes COTP data header, then a 12-byte S7 ack-data header.
    if frame.len() < 15 {
        return Err(PlcError::Protocol("short response frame".to_string()));
    }
    let s7 = &frame[3..];
    if s7[0] != S7_PROTOCOL_ID || s7[1] != PDU_TYPE_ACK_DATA {
        return Err(PlcError::Protocol("unexpected PDU type".to_string()));
    }
    let param_len = u16::from_be_bytes([s7[6], s7[7]]) as usize;
    let data_len = u16::from_be_bytes([s7[8], s7[9]]) as usize;
    let (err_class, err_code) = (s7[10], s7[11]);
    if err_class != 0 || err_code != 0 {
        return Err(PlcError::Protocol(format!(
            "controller error class {:#04x} code {:#04x}",
            err_class, err_code
        )));
    }
    if s7.len() < 12 + param_len + data_len {
        return Err(PlcError::Protocol("truncated response frame".to_string()));
    }
    let params = s7[12..12 + param_len].to_vec();
    let data = s7[12 + param_len..12 + param_len + data_len].to_vec();
    Ok((params, data))
}

/// Extracts the payload of a single read item.
fn parse_read_data(data: &[u8], expected: usize) -> Result<Vec<u8>, PlcError> {
    if data.len() < 4 {
        return Err(PlcError::Protocol("short read item".to_string()));
    }
    if data[0] != ITEM_READ_OK {
        return Err(PlcError::Protocol(format!(
            "item read failed: return code {:#04x}",
            data[0]
        )));
    }
    let transport = data[1];
    let mut length = u16::from_be_bytes([data[2], data[3]]) as usize;
    if transport == 0x03 || transport == 0x04 {
        // These transport sizes count the payload in bits.
        length /= 8;
    }
    if length < expected || data.len() < 4 + expected {
        return Err(PlcError::Protocol("short read payload".to_string()));
    }
    Ok(data[4..4 + expected].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tpkt_wrap_prepends_length() {
        let frame = tpkt_wrap(&[0xaa, 0xbb, 0xcc]);
        assert_eq!(frame, vec![0x03, 0x00, 0x00, 0x07, 0xaa, 0xbb, 0xcc]);
    }

    #[test]
    fn test_cotp_connect_request_encodes_rack_and_slot() {
        let frame = cotp_connect_request(0, 1);
        assert_eq!(frame[1], 0xe0);
        assert_eq!(*frame.last().unwrap(), 0x01);

        let frame = cotp_connect_request(1, 2);
        assert_eq!(*frame.last().unwrap(), 0x22);
    }

    #[test]
    fn test_read_parameters_for_default_speed_register() {
        // DB4, byte offset 28, 4 bytes -> bit address 224.
        let params = read_parameters(4, 28, 4);
        assert_eq!(
            params,
            vec![
                0x04, 0x01, // read var, one item
                0x12, 0x0a, 0x10, 0x02, // item header, byte transport
                0x00, 0x04, // length
                0x00, 0x04, // DB 4
                0x84, // data block area
                0x00, 0x00, 0xe0, // bit address 224
            ]
        );
    }

    #[test]
    fn test_parse_ack_rejects_controller_error() {
        let mut frame = vec![0x02, 0xf0, 0x80];
        frame.extend_from_slice(&[
            0x32, 0x03, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x81, 0x04,
        ]);
        let err = parse_ack(&frame).unwrap_err();
        assert!(matches!(err, PlcError::Protocol(_)));
    }

    #[test]
    fn test_parse_ack_splits_params_and_data() {
        let mut frame = vec![0x02, 0xf0, 0x80];
        frame.extend_from_slice(&[
            0x32, 0x03, 0x00, 0x00, 0x00, 0x01, // header + ref
            0x00, 0x02, // param length
            0x00, 0x08, // data length
            0x00, 0x00, // no error
        ]);
        frame.extend_from_slice(&[0x04, 0x01]); // read var, one item
        frame.extend_from_slice(&[0xff, 0x04, 0x00, 0x20, 0x41, 0x48, 0x00, 0x00]);

        let (params, data) = parse_ack(&frame).unwrap();
        assert_eq!(params, vec![0x04, 0x01]);
        assert_eq!(data.len(), 8);

        let payload = parse_read_data(&data, 4).unwrap();
        assert_eq!(f32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]), 12.5);
    }

    #[test]
    fn test_parse_read_data_rejects_failed_item() {
        // Return code 0x0a: object does not exist.
        let data = [0x0a, 0x00, 0x00, 0x00];
        assert!(parse_read_data(&data, 4).is_err());
    }

    #[test]
    fn test_parse_read_data_rejects_short_payload() {
        let data = [0xff, 0x04, 0x00, 0x10, 0x41, 0x48];
        assert!(parse_read_data(&data, 4).is_err());
    }
}
