use system::serde_json::{self, json};
use system::{
    Codec, CodecError, Color, DrawingEvent, Frame, IdentifiableCommand, IdentifiableEvent, Point,
    RoomEvent, RoomRef, StrokeStyle, SystemCommand, Tool,
};

fn begin_stroke() -> DrawingEvent {
    DrawingEvent::BeginStroke {
        stroke_id: "s-1".into(),
        style: StrokeStyle {
            tool: Tool::Pen,
            color: "#000".parse::<Color>().unwrap(),
            width: 2.0,
        },
        point: Point::new(10.0, 10.0),
    }
}

#[test]
fn it_should_decode_json_join_by_code() {
    let frame = Frame::Text(
        json!({
            "command_id": 7,
            "command": { "join_room": { "room": { "code": "ABCD" } } }
        })
        .to_string(),
    );
    let command: IdentifiableCommand = Codec::Json.decode(&frame).expect("");
    assert_eq!(command.command_id, 7);
    assert_eq!(
        command.command,
        SystemCommand::JoinRoom {
            room: RoomRef::Code("ABCD".into())
        }
    );
}

#[test]
fn it_should_decode_json_drawing_events() {
    let frame = Frame::Text(
        json!({
            "command_id": 1,
            "command": { "draw": { "begin-stroke": {
                "stroke_id": "s-1",
                "style": { "tool": "pen", "color": "#000", "width": 2 },
                "point": [10, 10]
            } } }
        })
        .to_string(),
    );
    let command: IdentifiableCommand = Codec::Json.decode(&frame).expect("");
    assert_eq!(command.command, SystemCommand::Draw(begin_stroke()));

    let frame = Frame::Text(r#"{"command_id":2,"command":{"draw":"clear"}}"#.into());
    let command: IdentifiableCommand = Codec::Json.decode(&frame).expect("");
    assert_eq!(command.command, SystemCommand::Draw(DrawingEvent::Clear));

    let frame = Frame::Text(
        r#"{"command_id":3,"command":{"draw":{"delete-stroke":{"stroke_id":"s-1"}}}}"#.into(),
    );
    let command: IdentifiableCommand = Codec::Json.decode(&frame).expect("");
    assert_eq!(
        command.command,
        SystemCommand::Draw(DrawingEvent::DeleteStroke {
            stroke_id: "s-1".into()
        })
    );

    let frame = Frame::Text(r#"{"command_id":4,"command":"leave_room"}"#.into());
    let command: IdentifiableCommand = Codec::Json.decode(&frame).expect("");
    assert_eq!(command.command, SystemCommand::LeaveRoom);
}

#[test]
fn it_should_reject_invalid_color_at_decode_time() {
    let frame = Frame::Text(
        json!({
            "command_id": 1,
            "command": { "draw": { "begin-stroke": {
                "stroke_id": "s-1",
                "style": { "tool": "pen", "color": "black", "width": 2 },
                "point": [10, 10]
            } } }
        })
        .to_string(),
    );
    let result: Result<IdentifiableCommand, _> = Codec::Json.decode(&frame);
    assert!(matches!(result, Err(CodecError::Json(_))));
}

#[test]
fn it_should_carry_bincode_commands_in_binary_frames() {
    let command = IdentifiableCommand {
        command_id: 42,
        command: SystemCommand::Draw(begin_stroke()),
    };
    let frame = Codec::Bincode.encode(&command).expect("");
    assert!(matches!(frame, Frame::Binary(_)));

    let decoded: IdentifiableCommand = Codec::Bincode.decode(&frame).expect("");
    assert_eq!(decoded.command_id, 42);
    assert_eq!(decoded.command, command.command);
}

#[test]
fn it_should_refuse_frames_of_the_other_kind() {
    let frame = Frame::Binary(vec![0, 1, 2]);
    let result: Result<IdentifiableCommand, _> = Codec::Json.decode(&frame);
    assert!(matches!(
        result,
        Err(CodecError::UnexpectedFrame { kind: "binary", .. })
    ));
}

#[test]
fn relayed_drawing_keeps_the_original_color_text() {
    let event = IdentifiableEvent::room_event(RoomEvent::Drawing {
        from: 1,
        event: begin_stroke(),
    });
    let value = serde_json::to_value(&event).expect("");
    assert_eq!(
        value["by_system"]["system_event"]["room_event"]["drawing"]["event"]["begin-stroke"]
            ["style"]["color"],
        json!("#000")
    );
}
