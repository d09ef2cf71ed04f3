mod utils;

use std::sync::Arc;

use tn5250e::error::{FieldValidationError, InputRejection};
use tn5250e::lib5250::codes::{
    AID_ENTER, ATTR_5250_NORMAL, CC2_UNLOCK, CMD_CLEAR_UNIT, ERR_EXIT_NOT_VALID, ERR_MANDATORY_ENTRY,
    ERR_NO_FIELD, ESC, SBA,
};
use tn5250e::lib5250::{KeyboardState, LockReason, OrderDecoder, ScreenState};
use tn5250e::protocol_common::Cp037Converter;
use tn5250e::KeyboardInputProcessor;
use utils::{record, sba, sf, wtd};

fn processor() -> KeyboardInputProcessor {
    utils::init_logging();
    KeyboardInputProcessor::new(Arc::new(Cp037Converter))
}

/// 24x80 screen with the given fields as (start, ffw1, ffw2, length), cursor on the first.
fn screen(fields: &[(usize, u8, u8, usize)]) -> ScreenState {
    let mut screen = ScreenState::new(24, 80);
    for &(start, ffw1, ffw2, length) in fields {
        screen.fields.define_field(start, ffw1, ffw2, length).unwrap();
    }
    if let Some(first) = screen.fields.first_input_field().map(|f| f.start()) {
        screen.buffer.set_cursor_address(first).unwrap();
    }
    screen
}

fn text(screen: &ScreenState, start: usize) -> String {
    screen.fields.get(start).unwrap().text()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_field_stops_at_letter() {
        let mut screen = screen(&[(0, 0x43, 0x00, 5)]);
        let report = processor().submit("12a34", &mut screen);

        assert_eq!(text(&screen, 0), "12");
        assert!(screen.fields.get(0).unwrap().is_modified());
        assert_eq!(
            report.rejection,
            Some(InputRejection::Field(FieldValidationError::NumericOnly('a')))
        );
        assert_eq!(screen.oia.state(), KeyboardState::Unlocked);
        assert_eq!(screen.oia.message(), None);
    }

    #[test]
    fn test_signed_numeric_allows_one_leading_sign() {
        let mut screen = screen(&[(0, 0x47, 0x00, 5)]);
        let mut keyboard = processor();
        assert_eq!(keyboard.submit("-12", &mut screen).rejection, None);
        assert_eq!(text(&screen, 0), "-12");

        let mut screen = super::screen(&[(0, 0x47, 0x00, 5)]);
        let report = keyboard.submit("1-", &mut screen);
        assert_eq!(
            report.rejection,
            Some(InputRejection::Field(FieldValidationError::SignPosition('-')))
        );
        assert_eq!(text(&screen, 0), "1");
    }

    #[test]
    fn test_right_to_left_field_stores_logical_order() {
        let mut screen = screen(&[(0, 0x44, 0x00, 5)]);
        processor().submit("abc", &mut screen);
        let field = screen.fields.get(0).unwrap();
        assert_eq!(field.text(), "abc");
        assert!(field.renders_reversed());
    }

    #[test]
    fn test_monocase_field_upper_cases() {
        let mut screen = screen(&[(0, 0x40, 0x20, 5)]);
        processor().submit("abc", &mut screen);
        assert_eq!(text(&screen, 0), "ABC");
    }

    #[test]
    fn test_overflow_truncates_instead_of_wrapping() {
        let mut screen = screen(&[(0, 0x40, 0x00, 3), (10, 0x40, 0x00, 5)]);
        let report = processor().submit("abcdef", &mut screen);
        assert_eq!(report.rejection, None);
        assert_eq!(text(&screen, 0), "abc");
        assert!(screen.fields.get(10).unwrap().is_blank());
        assert_eq!(screen.buffer.cursor_address(), 2);
    }

    #[test]
    fn test_field_exit_required_blocks_tab() {
        let mut screen = screen(&[(0, 0x40, 0x40, 5), (10, 0x40, 0x00, 5)]);
        let mut keyboard = processor();
        let report = keyboard.submit("ab[tab]", &mut screen);
        assert_eq!(
            report.rejection,
            Some(InputRejection::Field(FieldValidationError::FieldExitRequired(0)))
        );
        assert_eq!(screen.oia.state(), KeyboardState::Locked(LockReason::ErrorCode(ERR_EXIT_NOT_VALID)));
        assert!(screen.oia.take_bell());

        let report = keyboard.submit("[reset][fldext]", &mut screen);
        assert_eq!(report.rejection, None);
        assert_eq!(screen.buffer.cursor_address(), 10);
        assert_eq!(text(&screen, 0), "ab");
    }

    #[test]
    fn test_field_exit_checked_before_mandatory_entry() {
        let mut screen = screen(&[(0, 0x40, 0x40, 5), (10, 0x40, 0x08, 5)]);
        let report = processor().submit("a[enter]", &mut screen);
        assert_eq!(
            report.rejection,
            Some(InputRejection::Field(FieldValidationError::FieldExitRequired(0)))
        );
        assert!(report.outbound.is_empty());
    }

    #[test]
    fn test_pending_field_exit_dropped_with_old_format() {
        let mut screen = screen(&[(0, 0x40, 0x40, 5)]);
        let mut keyboard = processor();
        assert_eq!(keyboard.submit("1", &mut screen).rejection, None);

        let mut orders = sba(1, 1);
        orders.extend(sf(0x40, 0x00, ATTR_5250_NORMAL, 5));
        let mut data = vec![ESC, CMD_CLEAR_UNIT];
        data.extend(wtd(0, CC2_UNLOCK, &orders));
        let mut decoder = OrderDecoder::new(Arc::new(Cp037Converter), "IBM-3179-2");
        decoder.decode_record(&record(&data), &mut screen).unwrap();
        assert_eq!(screen.oia.state(), KeyboardState::Unlocked);

        let report = keyboard.submit("[enter]", &mut screen);
        assert_eq!(report.rejection, None);
        assert_eq!(report.outbound.len(), 1);
    }

    #[test]
    fn test_field_exit_still_required_while_format_unchanged() {
        let mut screen = screen(&[(0, 0x40, 0x40, 5)]);
        let mut keyboard = processor();
        keyboard.submit("1", &mut screen);
        screen.write_char(1, '2', ATTR_5250_NORMAL).unwrap();
        let report = keyboard.submit("[enter]", &mut screen);
        assert_eq!(
            report.rejection,
            Some(InputRejection::Field(FieldValidationError::FieldExitRequired(0)))
        );
    }

    #[test]
    fn test_mandatory_field_blocks_blank_submission() {
        let mut screen = screen(&[(0, 0x40, 0x08, 5)]);
        let mut keyboard = processor();

        let report = keyboard.submit("  [enter]", &mut screen);
        assert!(report.outbound.is_empty());
        assert_eq!(
            report.rejection,
            Some(InputRejection::Field(FieldValidationError::MandatoryEntry(0)))
        );
        assert_eq!(
            screen.oia.state(),
            KeyboardState::Locked(LockReason::ErrorCode(ERR_MANDATORY_ENTRY))
        );

        let report = keyboard.submit("[reset]x[enter]", &mut screen);
        assert_eq!(report.rejection, None);
        assert_eq!(report.outbound.len(), 1);
        assert_eq!(screen.oia.state(), KeyboardState::Locked(LockReason::HostOutput));
    }

    #[test]
    fn test_auto_enter_submits_when_field_fills() {
        let mut screen = screen(&[(0, 0x40, 0x80, 3)]);
        let report = processor().submit("abc", &mut screen);
        assert_eq!(report.outbound.len(), 1);
        assert_eq!(&report.outbound[0][10..], &[1, 3, AID_ENTER, SBA, 1, 1, 0x81, 0x82, 0x83]);
        assert_eq!(screen.oia.state(), KeyboardState::Locked(LockReason::HostOutput));
    }

    #[test]
    fn test_auto_enter_waits_for_mandatory_fields() {
        let mut screen = screen(&[(0, 0x40, 0x80, 2), (10, 0x40, 0x08, 5)]);
        let report = processor().submit("ab", &mut screen);
        assert!(report.outbound.is_empty());
        assert_eq!(
            report.rejection,
            Some(InputRejection::Field(FieldValidationError::MandatoryEntry(10)))
        );
        assert_eq!(screen.buffer.cursor_address(), 10);
    }

    #[test]
    fn test_field_exit_right_adjusts_with_zeros() {
        let mut screen = screen(&[(0, 0x43, 0x05, 5)]);
        processor().submit("12[fldext]", &mut screen);
        assert_eq!(text(&screen, 0), "00012");
    }

    #[test]
    fn test_backspace_deletes_left_of_cursor() {
        let mut screen = screen(&[(0, 0x40, 0x00, 5)]);
        let report = processor().submit("abc[backspace]", &mut screen);
        assert_eq!(report.rejection, None);
        assert_eq!(text(&screen, 0), "ab");
        assert_eq!(screen.buffer.cursor_address(), 2);
        assert_eq!(screen.buffer.cell_at(2).unwrap().ch, '\0');
    }

    #[test]
    fn test_backspace_shifts_rest_of_field_left() {
        let mut screen = screen(&[(0, 0x40, 0x00, 5)]);
        processor().submit("ab[left][backspace]", &mut screen);
        assert_eq!(text(&screen, 0), "b");
        assert_eq!(screen.buffer.cursor_address(), 0);
        assert!(screen.fields.get(0).unwrap().is_modified());
    }

    #[test]
    fn test_backspace_at_field_start_rejected() {
        let mut screen = screen(&[(10, 0x40, 0x00, 5)]);
        let report = processor().submit("[backspace]", &mut screen);
        assert_eq!(report.rejection, Some(InputRejection::Field(FieldValidationError::AtFieldStart)));
        assert_eq!(screen.oia.state(), KeyboardState::Locked(LockReason::ErrorCode(ERR_NO_FIELD)));
        assert_eq!(screen.buffer.cursor_address(), 10);
    }

    #[test]
    fn test_bypass_field_rejects_typing() {
        let mut screen = screen(&[(0, 0x60, 0x00, 5)]);
        screen.buffer.set_cursor_address(0).unwrap();
        let report = processor().submit("a", &mut screen);
        assert_eq!(report.rejection, Some(InputRejection::Field(FieldValidationError::Bypass)));
        assert!(screen.fields.get(0).unwrap().is_blank());
    }

    #[test]
    fn test_typing_outside_fields_rejected() {
        let mut screen = screen(&[(10, 0x40, 0x00, 5)]);
        screen.buffer.set_cursor_address(0).unwrap();
        let report = processor().submit("a", &mut screen);
        assert_eq!(report.rejection, Some(InputRejection::Field(FieldValidationError::NoField)));
    }

    #[test]
    fn test_fields_in_order_restarts() {
        let screen = screen(&[(40, 0x40, 0x00, 5), (0, 0x40, 0x00, 5), (20, 0x60, 0x00, 5)]);
        let order = screen.fields.fields_in_order();
        let first: Vec<usize> = order.clone().map(|f| f.start()).collect();
        let second: Vec<usize> = order.map(|f| f.start()).collect();
        assert_eq!(first, vec![0, 20, 40]);
        assert_eq!(first, second);
    }
}
