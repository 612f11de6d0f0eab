mod test_event_publisher;
