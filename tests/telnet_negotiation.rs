mod utils;

use proptest::prelude::*;
use tn5250e::lib5250::telnet::{
    escape, NegotiationState, StreamStatus, TelnetNegotiator, TelnetOption, DO, DONT, EOR, IAC,
    SB, SE, WILL, WONT,
};
use tn5250e::{ProtocolError, SessionConfig};

fn negotiator() -> TelnetNegotiator {
    utils::init_logging();
    TelnetNegotiator::new(&SessionConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_do_terminal_type_answered_with_will() {
        let mut telnet = negotiator();
        let out = telnet.process(&[0xFF, 0xFD, 0x18]).unwrap();
        assert_eq!(out.replies, vec![0xFF, 0xFB, 0x18]);
        assert!(out.data.is_empty());
        assert_eq!(out.status, StreamStatus::Complete);
    }

    #[test]
    fn test_terminal_type_send_answered_with_configured_type() {
        let mut telnet = negotiator();
        let out = telnet.process(&[0xFF, 0xFA, 0x18, 0x01, 0xFF, 0xF0]).unwrap();
        let mut expected = vec![IAC, SB, 24, 0];
        expected.extend_from_slice(b"IBM-3179-2");
        expected.extend_from_slice(&[IAC, SE]);
        assert_eq!(out.replies, expected);
    }

    #[test]
    fn test_unsupported_options_refused_explicitly() {
        let mut telnet = negotiator();
        let out = telnet.process(&[IAC, DO, 99, IAC, WILL, 98]).unwrap();
        assert_eq!(out.replies, vec![IAC, WONT, 99, IAC, DONT, 98]);
    }

    #[test]
    fn test_option_outside_whitelist_refused() {
        let config = SessionConfig::default().with_options(&[TelnetOption::TerminalType]);
        let mut telnet = TelnetNegotiator::new(&config);
        let out = telnet.process(&[IAC, DO, 0]).unwrap();
        assert_eq!(out.replies, vec![IAC, WONT, 0]);
        assert_eq!(telnet.option_state(0).local, NegotiationState::Disabled);
    }

    #[test]
    fn test_repeated_request_not_answered_twice() {
        let mut telnet = negotiator();
        assert_eq!(telnet.process(&[IAC, DO, 24]).unwrap().replies.len(), 3);
        assert!(telnet.process(&[IAC, DO, 24]).unwrap().replies.is_empty());
    }

    #[test]
    fn test_full_negotiation_completes() {
        let mut telnet = negotiator();
        assert!(!telnet.is_negotiation_complete());
        telnet
            .process(&[IAC, DO, 0, IAC, WILL, 0, IAC, DO, 25, IAC, WILL, 25, IAC, DO, 3])
            .unwrap();
        assert!(telnet.is_negotiation_complete());
        assert_eq!(telnet.option_state(25).remote, NegotiationState::Enabled);
    }

    #[test]
    fn test_command_split_across_chunks_needs_more_data() {
        let mut telnet = negotiator();
        let first = telnet.process(&[0x40, IAC]).unwrap();
        assert_eq!(first.status, StreamStatus::NeedMoreData);
        assert_eq!(first.data, vec![0x40]);
        assert!(!telnet.is_idle());

        let second = telnet.process(&[DO, 24]).unwrap();
        assert_eq!(second.status, StreamStatus::Complete);
        assert_eq!(second.replies, vec![IAC, WILL, 24]);
    }

    #[test]
    fn test_end_of_record_marks_offsets() {
        let mut telnet = negotiator();
        let out = telnet.process(&[1, 2, IAC, EOR, 3, IAC, EOR]).unwrap();
        assert_eq!(out.data, vec![1, 2, 3]);
        assert_eq!(out.record_ends, vec![2, 3]);
    }

    #[test]
    fn test_unterminated_subnegotiation_is_an_error() {
        let mut telnet = negotiator();
        let err = telnet.process(&[IAC, SB, 24, 1, IAC, 0x41]).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::UnterminatedSubnegotiation { option: 24, interrupted_by: Some(0x41) }
        );
        // The parser recovers for the next chunk.
        assert!(telnet.is_idle());
    }

    #[test]
    fn test_stream_closed_inside_subnegotiation() {
        let mut telnet = negotiator();
        let out = telnet.process(&[IAC, SB, 24, 1]).unwrap();
        assert_eq!(out.status, StreamStatus::NeedMoreData);
        assert!(matches!(
            telnet.end_of_stream(),
            Err(ProtocolError::UnterminatedSubnegotiation { option: 24, interrupted_by: None })
        ));
    }

    #[test]
    fn test_oversized_subnegotiation_rejected() {
        let config = SessionConfig { max_subnegotiation_len: 8, ..SessionConfig::default() };
        let mut telnet = TelnetNegotiator::new(&config);
        let mut input = vec![IAC, SB, 39];
        input.extend_from_slice(&[0x41; 9]);
        let err = telnet.process(&input).unwrap_err();
        assert_eq!(err, ProtocolError::OversizedSubnegotiation { option: 39, limit: 8 });
    }

    #[test]
    fn test_iac_inside_terminal_type_payload_rejected() {
        let mut telnet = negotiator();
        let err = telnet.process(&[IAC, SB, 24, 0, IAC, IAC, 0x41, IAC, SE]).unwrap_err();
        assert_eq!(err, ProtocolError::IacInTerminalType);
    }

    #[test]
    fn test_unknown_command_after_iac() {
        let mut telnet = negotiator();
        assert_eq!(telnet.process(&[IAC, 0x10]).unwrap_err(), ProtocolError::UnknownCommand(0x10));
    }

    #[test]
    fn test_replies_before_bad_command_lead_next_output() {
        let mut telnet = negotiator();
        let err = telnet.process(&[IAC, DO, 24, IAC, 0x10]).unwrap_err();
        assert_eq!(err, ProtocolError::UnknownCommand(0x10));

        // The WILL was owed even though the chunk failed; the repeat DO is not answered twice.
        let out = telnet.process(&[IAC, DO, 24]).unwrap();
        assert_eq!(out.replies, vec![IAC, WILL, 24]);
        assert_eq!(telnet.process(&[IAC, DO, 24]).unwrap().replies, Vec::<u8>::new());
    }

    #[test]
    fn test_held_replies_can_be_taken_directly() {
        let mut telnet = negotiator();
        assert!(telnet.process(&[IAC, DO, 24, IAC, DO, 25, IAC, 0x10]).is_err());
        assert_eq!(telnet.take_held_replies(), vec![IAC, WILL, 24, IAC, WILL, 25]);
        assert!(telnet.take_held_replies().is_empty());
        assert!(telnet.process(&[]).unwrap().replies.is_empty());
    }

    #[test]
    fn test_new_environ_sends_device_name() {
        let mut options = TelnetOption::default_whitelist().to_vec();
        options.push(TelnetOption::NewEnviron);
        let config = SessionConfig::default().with_device_name("DSP01").with_options(&options);
        let mut telnet = TelnetNegotiator::new(&config);
        let out = telnet.process(&[IAC, SB, 39, 1, IAC, SE]).unwrap();

        let mut expected = vec![IAC, SB, 39, 0, 0];
        expected.extend_from_slice(b"DEVNAME");
        expected.push(1);
        expected.extend_from_slice(b"DSP01");
        expected.extend_from_slice(&[IAC, SE]);
        assert_eq!(out.replies, expected);
    }

    proptest! {
        #[test]
        fn escaped_data_decodes_to_itself(data in proptest::collection::vec(any::<u8>(), 0..256)) {
            let mut telnet = TelnetNegotiator::new(&SessionConfig::default());
            let out = telnet.process(&escape(&data)).unwrap();
            prop_assert_eq!(out.data, data);
            prop_assert!(out.replies.is_empty());
            prop_assert_eq!(out.status, StreamStatus::Complete);
        }

        #[test]
        fn doubled_iac_is_one_data_byte(count in 1usize..64) {
            let mut telnet = TelnetNegotiator::new(&SessionConfig::default());
            let input: Vec<u8> = std::iter::repeat([IAC, IAC]).take(count).flatten().collect();
            let out = telnet.process(&input).unwrap();
            prop_assert_eq!(out.data, vec![IAC; count]);
        }

        #[test]
        fn split_point_does_not_change_data(
            data in proptest::collection::vec(any::<u8>(), 1..128),
            split in any::<proptest::sample::Index>(),
        ) {
            let wire = escape(&data);
            let (head, tail) = wire.split_at(split.index(wire.len()));
            let mut telnet = TelnetNegotiator::new(&SessionConfig::default());
            let mut joined = telnet.process(head).unwrap().data;
            joined.extend(telnet.process(tail).unwrap().data);
            prop_assert_eq!(joined, data);
        }
    }
}
